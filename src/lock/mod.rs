//! Host-wide mutual exclusion between processes sharing one cache directory.

use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lock that at most one process on the host may hold at a time.
pub trait ProcessLock: Send + Sync {
    /// Takes the lock if it is free. `Ok(true)` also when already held here.
    fn try_acquire(&self) -> io::Result<bool>;

    /// Waits up to `timeout` for the current owner to let go, taking the
    /// lock as soon as it does.
    fn wait_release(&self, timeout: Duration) -> io::Result<bool>;

    fn release(&self);

    fn is_held(&self) -> bool;
}

/// `flock`-style advisory lock on a file named after the cache root.
pub struct FileProcessLock {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileProcessLock {
    /// Lock for `cache_root`, stored in the system temp directory so every
    /// process on the host derives the same file.
    pub fn for_cache_root(cache_root: &Path) -> Self {
        Self::in_dir(&std::env::temp_dir(), cache_root)
    }

    pub fn in_dir(lock_dir: &Path, cache_root: &Path) -> Self {
        Self {
            path: lock_dir.join(Self::lock_name(cache_root)),
            file: Mutex::new(None),
        }
    }

    /// Stable name derived from the cache root path.
    pub fn lock_name(cache_root: &Path) -> String {
        let root = cache_root
            .canonicalize()
            .unwrap_or_else(|_| cache_root.to_path_buf());
        let hash = xxh3_64(root.to_string_lossy().as_bytes());
        format!("diskjanitor-{:016x}.lock", hash)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProcessLock for FileProcessLock {
    fn try_acquire(&self) -> io::Result<bool> {
        let mut guard = self.file.lock();
        if guard.is_some() {
            return Ok(true);
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(component = "process-lock", event = "acquired", path = ?self.path, "cross-process lock acquired");
                *guard = Some(file);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn wait_release(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.try_acquire()? {
                return Ok(true);
            }
            let left = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => POLL_INTERVAL,
            };
            if left.is_zero() {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL.min(left));
        }
    }

    fn release(&self) {
        if let Some(file) = self.file.lock().take() {
            let _ = file.unlock();
            debug!(component = "process-lock", event = "released", path = ?self.path, "cross-process lock released");
        }
    }

    fn is_held(&self) -> bool {
        self.file.lock().is_some()
    }
}

impl Drop for FileProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
