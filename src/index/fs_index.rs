// Folder index built by scanning the cache directory tree.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use super::path;
use super::{FileMeta, FolderIndex, SortedFile};
use crate::error::{CleanupError, Result};

#[derive(Debug, Default)]
struct Folder {
    valid: bool,
    files: HashMap<String, FileMeta>,
    subfolders: Vec<String>,
}

/// In-memory listing of every folder the cleanup engine has looked at.
///
/// Listings start invalid and become valid after [`FolderIndex::populate`].
/// Writers of the cache keep it current through `set_meta`.
#[derive(Debug, Default)]
pub struct FsIndex {
    folders: RwLock<HashMap<String, Folder>>,
}

impl FsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a folder listing stale so the next clean re-scans it.
    pub fn invalidate(&self, rel: &str) {
        if let Some(folder) = self.folders.write().get_mut(rel) {
            folder.valid = false;
        }
    }

    fn scan(phys: &Path) -> io::Result<Folder> {
        let mut folder = Folder {
            valid: true,
            ..Folder::default()
        };

        let entries = match fs::read_dir(phys) {
            Ok(entries) => entries,
            // A shard that was never written to is simply empty.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(folder),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let md = match entry.metadata() {
                Ok(md) => md,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if md.is_dir() {
                folder.subfolders.push(name);
            } else if md.is_file() {
                let updated_at = md.modified()?;
                let accessed_at = md.accessed().unwrap_or(updated_at);
                folder.files.insert(name, FileMeta::new(accessed_at, updated_at));
            }
        }
        folder.subfolders.sort();
        Ok(folder)
    }
}

impl FolderIndex for FsIndex {
    fn is_valid(&self, rel: &str) -> bool {
        self.folders.read().get(rel).map(|f| f.valid).unwrap_or(false)
    }

    fn populate(&self, rel: &str, phys: &Path) -> Result<()> {
        let folder = Self::scan(phys).map_err(|e| CleanupError::io(phys, e))?;
        debug!(
            component = "fs-index",
            event = "populated",
            folder = %rel,
            files = folder.files.len(),
            subfolders = folder.subfolders.len(),
            "folder listing scanned"
        );
        self.folders.write().insert(rel.to_string(), folder);
        Ok(())
    }

    fn subfolders(&self, rel: &str) -> Vec<String> {
        self.folders
            .read()
            .get(rel)
            .map(|f| f.subfolders.clone())
            .unwrap_or_default()
    }

    fn file_count(&self, rel: &str) -> usize {
        self.folders.read().get(rel).map(|f| f.files.len()).unwrap_or(0)
    }

    fn sorted_files(&self, rel: &str) -> Vec<SortedFile> {
        let mut files: Vec<SortedFile> = match self.folders.read().get(rel) {
            Some(folder) => folder
                .files
                .iter()
                .map(|(name, meta)| SortedFile {
                    name: name.clone(),
                    meta: *meta,
                })
                .collect(),
            None => return Vec::new(),
        };
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
        let folders = self.folders.read();
        folders
            .get(path::parent(rel))?
            .files
            .get(path::file_name(rel))
            .copied()
    }

    fn set_meta(&self, rel: &str, meta: Option<FileMeta>) {
        let mut folders = self.folders.write();
        let folder = folders.entry(path::parent(rel).to_string()).or_default();
        let name = path::file_name(rel);
        match meta {
            Some(meta) => {
                folder.files.insert(name.to_string(), meta);
            }
            None => {
                folder.files.remove(name);
            }
        }
    }
}
