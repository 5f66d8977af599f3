//! Contracts of the collaborators the cleanup engine drives, plus reference
//! implementations backed by the local filesystem.

pub mod fs_index;
pub mod path;
pub mod path_lock;

pub use fs_index::FsIndex;
pub use path_lock::KeyedPathLock;

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::Result;

/// Timestamps of one cached file as known to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub accessed_at: SystemTime,
    pub updated_at: SystemTime,
}

impl FileMeta {
    pub fn new(accessed_at: SystemTime, updated_at: SystemTime) -> Self {
        Self {
            accessed_at,
            updated_at,
        }
    }

    /// Most recent moment the file was useful. Lower sorts first for eviction.
    pub fn last_used(&self) -> SystemTime {
        self.accessed_at.max(self.updated_at)
    }
}

/// One entry of a folder listing ordered for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedFile {
    pub name: String,
    pub meta: FileMeta,
}

/// Per-folder metadata view maintained by the surrounding cache.
///
/// Relative paths use `/` separators; the cache root is `""`.
pub trait FolderIndex: Send + Sync {
    /// True when the folder listing was scanned from disk and is current.
    fn is_valid(&self, rel: &str) -> bool;

    /// Scans the folder from disk and marks its listing valid.
    fn populate(&self, rel: &str, phys: &Path) -> Result<()>;

    fn subfolders(&self, rel: &str) -> Vec<String>;

    fn file_count(&self, rel: &str) -> usize;

    /// Files of the folder, oldest effective usage first.
    fn sorted_files(&self, rel: &str) -> Vec<SortedFile>;

    fn get_meta(&self, rel: &str) -> Option<FileMeta>;

    /// `None` drops the file from the index.
    fn set_meta(&self, rel: &str, meta: Option<FileMeta>);
}

/// Advisory per-path mutual exclusion shared with the writers of the cache.
pub trait PathLock: Send + Sync {
    /// Runs `f` while holding the lock for `rel`. Returns false, without
    /// running `f`, when the lock could not be taken within `timeout`.
    fn try_execute(&self, rel: &str, timeout: Duration, f: &mut dyn FnMut()) -> bool;
}
