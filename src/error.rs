// Error types shared by the cleanup engine and its collaborators.

use std::io;
use std::path::PathBuf;

/// Errors produced while running cleanup work.
///
/// None of these ever reach request-serving code: the scheduler turns them
/// into issues and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("invalid cleanup config: {0}")]
    InvalidConfig(String),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cross-process lock failed: {0}")]
    ProcessLock(#[source] io::Error),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("cleanup worker could not be joined: {0}")]
    WorkerJoin(String),
}

impl CleanupError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Sharing violations and permission errors are expected while other
/// processes read cached files.
pub fn is_contention(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock) {
        return true;
    }
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    #[cfg(windows)]
    if matches!(e.raw_os_error(), Some(32 | 33)) {
        return true;
    }
    false
}

pub type Result<T> = std::result::Result<T, CleanupError>;
