// In-memory stand-ins for the collaborators of the cleanup engine.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{CleanupError, Result};
use crate::index::{path, FileMeta, FolderIndex, PathLock, SortedFile};
use crate::issues::{Issue, IssueSink, Severity};
use crate::lock::ProcessLock;

#[derive(Debug, Default, Clone)]
struct FakeFolder {
    valid: bool,
    files: HashMap<String, FileMeta>,
    subfolders: Vec<String>,
}

/// Folder index whose listings are staged by the test.
#[derive(Debug, Default)]
pub struct FakeIndex {
    folders: Mutex<HashMap<String, FakeFolder>>,
    populated: Mutex<Vec<String>>,
    fail_populate: Mutex<HashSet<String>>,
    panic_populate: Mutex<HashSet<String>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a folder listing. Files are `(name, meta)`.
    pub fn add_folder(&self, rel: &str, files: Vec<(String, FileMeta)>, subfolders: &[&str], valid: bool) {
        self.folders.lock().insert(
            rel.to_string(),
            FakeFolder {
                valid,
                files: files.into_iter().collect(),
                subfolders: subfolders.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    pub fn fail_populate_of(&self, rel: &str) {
        self.fail_populate.lock().insert(rel.to_string());
    }

    pub fn panic_on_populate_of(&self, rel: &str) {
        self.panic_populate.lock().insert(rel.to_string());
    }

    /// Folders populated so far, in call order.
    pub fn populated(&self) -> Vec<String> {
        self.populated.lock().clone()
    }
}

impl FolderIndex for FakeIndex {
    fn is_valid(&self, rel: &str) -> bool {
        self.folders.lock().get(rel).map(|f| f.valid).unwrap_or(false)
    }

    fn populate(&self, rel: &str, phys: &Path) -> Result<()> {
        if self.panic_populate.lock().contains(rel) {
            panic!("index exploded on {rel}");
        }
        if self.fail_populate.lock().contains(rel) {
            return Err(CleanupError::io(
                phys,
                std::io::Error::other("scan failed"),
            ));
        }
        self.populated.lock().push(rel.to_string());
        self.folders.lock().entry(rel.to_string()).or_default().valid = true;
        Ok(())
    }

    fn subfolders(&self, rel: &str) -> Vec<String> {
        self.folders
            .lock()
            .get(rel)
            .map(|f| f.subfolders.clone())
            .unwrap_or_default()
    }

    fn file_count(&self, rel: &str) -> usize {
        self.folders.lock().get(rel).map(|f| f.files.len()).unwrap_or(0)
    }

    fn sorted_files(&self, rel: &str) -> Vec<SortedFile> {
        let mut files: Vec<SortedFile> = self
            .folders
            .lock()
            .get(rel)
            .map(|f| {
                f.files
                    .iter()
                    .map(|(name, meta)| SortedFile {
                        name: name.clone(),
                        meta: *meta,
                    })
                    .collect()
            })
            .unwrap_or_default();
        files.sort_by(|a, b| {
            a.meta
                .last_used()
                .cmp(&b.meta.last_used())
                .then(a.meta.updated_at.cmp(&b.meta.updated_at))
                .then_with(|| a.name.cmp(&b.name))
        });
        files
    }

    fn get_meta(&self, rel: &str) -> Option<FileMeta> {
        self.folders
            .lock()
            .get(path::parent(rel))?
            .files
            .get(path::file_name(rel))
            .copied()
    }

    fn set_meta(&self, rel: &str, meta: Option<FileMeta>) {
        let mut folders = self.folders.lock();
        let folder = folders.entry(path::parent(rel).to_string()).or_default();
        match meta {
            Some(meta) => {
                folder.files.insert(path::file_name(rel).to_string(), meta);
            }
            None => {
                folder.files.remove(path::file_name(rel));
            }
        }
    }
}

/// Path lock where selected paths are held forever by "someone else".
#[derive(Debug, Default)]
pub struct FakePathLock {
    held: Mutex<HashSet<String>>,
    attempts: AtomicUsize,
}

impl FakePathLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, rel: &str) {
        self.held.lock().insert(rel.to_string());
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl PathLock for FakePathLock {
    fn try_execute(&self, rel: &str, _timeout: Duration, f: &mut dyn FnMut()) -> bool {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.held.lock().contains(rel) {
            return false;
        }
        f();
        true
    }
}

/// Cross-process lock that the test hands to "another process" or back.
#[derive(Debug)]
pub struct FakeProcessLock {
    available: AtomicBool,
    held: AtomicBool,
    panic_on_acquire: AtomicBool,
    attempts: AtomicUsize,
}
impl FakeProcessLock {
    fn with_availability(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            held: AtomicBool::new(false),
            panic_on_acquire: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn free() -> Self {
        Self::with_availability(true)
    }

    pub fn owned_elsewhere() -> Self {
        Self::with_availability(false)
    }

    /// Every acquisition attempt panics.
    pub fn panicking() -> Self {
        let lock = Self::free();
        lock.panic_on_acquire.store(true, Ordering::SeqCst);
        lock
    }

    /// The other process lets go.
    pub fn make_available(&self) {
        self.available.store(true, Ordering::SeqCst);
    }

    /// Number of `try_acquire` calls so far, including those made while waiting.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}
impl ProcessLock for FakeProcessLock {
    fn try_acquire(&self) -> std::io::Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_acquire.load(Ordering::SeqCst) {
            panic!("lock backend exploded");
        }
        if self.held.load(Ordering::SeqCst) {
            return Ok(true);
        }
        if self.available.load(Ordering::SeqCst) {
            self.held.store(true, Ordering::SeqCst);
            return Ok(true);
        }
        Ok(false)
    }

    fn wait_release(&self, timeout: Duration) -> std::io::Result<bool> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        self.try_acquire()
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Sink that panics on `Error` issues and records the rest.
#[derive(Debug, Default)]
pub struct PanickingSink {
    pub recorded: Mutex<Vec<Issue>>,
}

impl PanickingSink {
    pub fn count(&self, severity: Severity) -> usize {
        self.recorded
            .lock()
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }
}

impl IssueSink for PanickingSink {
    fn report(&self, issue: Issue) {
        if issue.severity == Severity::Error {
            panic!("sink refused: {}", issue.summary);
        }
        self.recorded.lock().push(issue);
    }
}
