// Units of cleanup work.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use super::policy::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    PopulateFolder,
    PopulateFolderRecursive,
    CleanFolder,
    CleanFolderRecursive,
    RemoveFile,
    FlushAccessedDate,
}

impl WorkKind {
    pub fn is_recursive(&self) -> bool {
        matches!(self, WorkKind::PopulateFolderRecursive | WorkKind::CleanFolderRecursive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::PopulateFolder => "populate_folder",
            WorkKind::PopulateFolderRecursive => "populate_folder_recursive",
            WorkKind::CleanFolder => "clean_folder",
            WorkKind::CleanFolderRecursive => "clean_folder_recursive",
            WorkKind::RemoveFile => "remove_file",
            WorkKind::FlushAccessedDate => "flush_accessed_date",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces concrete removal targets on demand.
///
/// A source keeps its position between calls; calling it again after a
/// failed attempt moves on to the next candidate.
pub trait CandidateSource: Send + Sync {
    /// Next file to try, or `None` once no eligible file is left.
    fn next(&self, now: SystemTime) -> Option<WorkItem>;

    fn tier(&self) -> Option<Tier> {
        None
    }
}

/// A queued task.
///
/// For `RemoveFile` items produced by a folder clean, the paths name the
/// folder and `source` yields the actual file.
pub struct WorkItem {
    pub kind: WorkKind,
    pub relative_path: String,
    pub physical_path: PathBuf,
    pub(crate) source: Option<Arc<dyn CandidateSource>>,
}

impl WorkItem {
    pub fn new(kind: WorkKind, relative_path: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            relative_path: relative_path.into(),
            physical_path: physical_path.into(),
            source: None,
        }
    }

    /// Removal of one known file.
    pub fn remove_file(relative_path: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        Self::new(WorkKind::RemoveFile, relative_path, physical_path)
    }

    /// Removal slot in `folder` whose target is picked lazily by `source`.
    pub fn remove_candidate(
        folder_rel: impl Into<String>,
        folder_phys: impl Into<PathBuf>,
        source: Arc<dyn CandidateSource>,
    ) -> Self {
        Self {
            source: Some(source),
            ..Self::new(WorkKind::RemoveFile, folder_rel, folder_phys)
        }
    }

    pub fn source(&self) -> Option<&Arc<dyn CandidateSource>> {
        self.source.as_ref()
    }

    /// Tier of the candidate source, if any.
    pub fn tier(&self) -> Option<Tier> {
        self.source.as_ref().and_then(|s| s.tier())
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("kind", &self.kind)
            .field("relative_path", &self.relative_path)
            .field("physical_path", &self.physical_path)
            .field("tier", &self.tier())
            .finish()
    }
}
