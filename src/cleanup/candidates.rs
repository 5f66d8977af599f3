// Lazy removal candidates handed out one at a time from a sorted listing.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use super::item::{CandidateSource, WorkItem};
use super::policy::{EvictionPolicy, Tier};
use crate::index::{path, SortedFile};

/// Position in a folder listing shared by every source built over it.
///
/// Entries behind the cursor are never looked at again, so all removal
/// slots of one clean together cost at most one pass over the folder.
struct Cursor {
    folder_rel: String,
    folder_phys: PathBuf,
    files: Vec<SortedFile>,
    pos: usize,
}

/// Yields the next file of the listing that the given tier allows to remove.
pub struct TierCandidates {
    cursor: Arc<Mutex<Cursor>>,
    tier: Tier,
    policy: Arc<EvictionPolicy>,
}

impl CandidateSource for TierCandidates {
    fn next(&self, now: SystemTime) -> Option<WorkItem> {
        let mut cursor = self.cursor.lock();
        while cursor.pos < cursor.files.len() {
            let idx = cursor.pos;
            cursor.pos += 1;
            let file = &cursor.files[idx];
            if self.policy.should_remove(self.tier, &file.meta, now) {
                return Some(WorkItem::remove_file(
                    path::join(&cursor.folder_rel, &file.name),
                    cursor.folder_phys.join(&file.name),
                ));
            }
        }
        None
    }

    fn tier(&self) -> Option<Tier> {
        Some(self.tier)
    }
}

/// Hard and soft sources over one shared cursor, in that order.
pub fn tier_sources(
    folder_rel: &str,
    folder_phys: PathBuf,
    files: Vec<SortedFile>,
    policy: Arc<EvictionPolicy>,
) -> (Arc<dyn CandidateSource>, Arc<dyn CandidateSource>) {
    let cursor = Arc::new(Mutex::new(Cursor {
        folder_rel: folder_rel.to_string(),
        folder_phys,
        files,
        pos: 0,
    }));
    let hard = Arc::new(TierCandidates {
        cursor: cursor.clone(),
        tier: Tier::Hard,
        policy: policy.clone(),
    });
    let soft = Arc::new(TierCandidates {
        cursor,
        tier: Tier::Soft,
        policy,
    });
    (hard, soft)
}
