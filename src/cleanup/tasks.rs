// Turns queued work items into filesystem effects.

use parking_lot::Mutex;
use std::fs::{self, File, FileTimes};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::candidates;
use super::counters::Counters;
use super::item::{WorkItem, WorkKind};
use super::policy::EvictionPolicy;
use super::queue::WorkQueue;
use crate::error::{is_contention, CleanupError, Result};
use crate::index::{path, FolderIndex, PathLock};
use crate::issues::{Issue, IssueSink, Severity};

const SOURCE: &str = "cleanup";

/// Executes one work item at a time on behalf of the cleanup worker.
pub struct TaskRunner {
    queue: Arc<WorkQueue>,
    index: Arc<dyn FolderIndex>,
    path_lock: Arc<dyn PathLock>,
    issues: Arc<dyn IssueSink>,
    policy: Arc<EvictionPolicy>,
    counters: Arc<Counters>,
    file_lock_timeout: Duration,
    advisory_interval: Duration,
    last_advisory: Mutex<Option<Instant>>,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<WorkQueue>,
        index: Arc<dyn FolderIndex>,
        path_lock: Arc<dyn PathLock>,
        issues: Arc<dyn IssueSink>,
        policy: Arc<EvictionPolicy>,
        counters: Arc<Counters>,
        file_lock_timeout: Duration,
        advisory_interval: Duration,
    ) -> Self {
        Self {
            queue,
            index,
            path_lock,
            issues,
            policy,
            counters,
            file_lock_timeout,
            advisory_interval,
            last_advisory: Mutex::new(None),
        }
    }

    /// Pops and runs items until the queue is empty, `deadline` passes or
    /// shutdown is requested. Returns how many items ran.
    pub fn drain(&self, deadline: Instant, shutdown: &CancellationToken) -> usize {
        let mut processed = 0;
        while !shutdown.is_cancelled() && Instant::now() < deadline {
            let Some(item) = self.queue.pop_head() else {
                break;
            };
            self.run_one(item);
            processed += 1;
        }
        processed
    }

    /// Runs a single item. Failures, including panics, are reported and
    /// never propagate.
    pub fn run_one(&self, item: WorkItem) {
        let kind = item.kind;
        let rel = item.relative_path.clone();
        trace!(component = "cleanup", event = "dispatch", kind = %kind, path = %rel, "running task");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(item)));
        let (severity, err) = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => (Severity::Error, err),
            Err(payload) => (Severity::Critical, CleanupError::TaskPanicked(panic_message(&*payload))),
        };

        Counters::inc(&self.counters.task_failures);
        self.issues.report(
            Issue::new(severity, SOURCE, format!("cleanup task {} failed", kind))
                .with_details(format!("path={:?}: {}", rel, err)),
        );
    }

    fn dispatch(&self, item: WorkItem) -> Result<()> {
        match item.kind {
            WorkKind::PopulateFolder | WorkKind::PopulateFolderRecursive => self.populate(item),
            WorkKind::CleanFolder | WorkKind::CleanFolderRecursive => self.clean(item),
            WorkKind::RemoveFile => self.remove(item),
            WorkKind::FlushAccessedDate => self.flush_accessed_date(item),
        }
    }

    fn populate(&self, item: WorkItem) -> Result<()> {
        let rel = item.relative_path.as_str();
        if !self.index.is_valid(rel) {
            self.index.populate(rel, &item.physical_path)?;
            Counters::inc(&self.counters.populated_folders);
        }

        if item.kind.is_recursive() {
            for sub in self.index.subfolders(rel) {
                self.queue.append(WorkItem::new(
                    WorkKind::PopulateFolderRecursive,
                    path::join(rel, &sub),
                    item.physical_path.join(&sub),
                ));
            }
        }
        Ok(())
    }

    fn clean(&self, item: WorkItem) -> Result<()> {
        let recursive = item.kind.is_recursive();
        let rel = item.relative_path.clone();
        let phys = item.physical_path.clone();

        if !self.index.is_valid(&rel) {
            let populate = if recursive {
                WorkKind::PopulateFolderRecursive
            } else {
                WorkKind::PopulateFolder
            };
            // Clean again once the listing exists.
            self.queue
                .prepend_many(vec![WorkItem::new(populate, rel.as_str(), phys.as_path()), item]);
            return Ok(());
        }

        if recursive {
            let children: Vec<WorkItem> = self
                .index
                .subfolders(&rel)
                .into_iter()
                .map(|sub| {
                    WorkItem::new(WorkKind::CleanFolderRecursive, path::join(&rel, &sub), phys.join(&sub))
                })
                .collect();
            self.queue.prepend_many(children);
        }

        Counters::inc(&self.counters.cleaned_folders);
        let count = self.index.file_count(&rel);
        let over = self.policy.over_target(count);
        if over.is_zero() {
            return Ok(());
        }

        debug!(
            component = "cleanup",
            event = "folder_over_target",
            folder = %rel,
            files = count,
            over_max = over.over_max,
            over_optimal = over.over_optimal,
            "scheduling removals"
        );

        let files = self.index.sorted_files(&rel);
        let (hard, soft) = candidates::tier_sources(&rel, phys.clone(), files, self.policy.clone());

        // Hard slots are pushed last so they end up ahead of the soft ones.
        for _ in 0..over.over_optimal {
            self.queue
                .prepend_one(WorkItem::remove_candidate(rel.as_str(), phys.as_path(), soft.clone()));
        }
        for _ in 0..over.over_max {
            self.queue
                .prepend_one(WorkItem::remove_candidate(rel.as_str(), phys.as_path(), hard.clone()));
        }

        if over.over_max > 0 {
            self.advise_more_shards(&rel, count);
        }
        Ok(())
    }

    fn remove(&self, item: WorkItem) -> Result<()> {
        let WorkItem {
            relative_path: folder_rel,
            physical_path: folder_phys,
            source,
            ..
        } = item;

        let (rel, phys) = match &source {
            Some(source) => match source.next(SystemTime::now()) {
                Some(target) => (target.relative_path, target.physical_path),
                None => {
                    Counters::inc(&self.counters.exhausted_sources);
                    return Ok(());
                }
            },
            None => (folder_rel.clone(), folder_phys.clone()),
        };

        let mut outcome: Result<()> = Ok(());
        let locked = self
            .path_lock
            .try_execute(&rel, self.file_lock_timeout, &mut || {
                outcome = self.remove_locked(&rel, &phys);
            });

        if !locked {
            Counters::inc(&self.counters.deferred_removals);
            debug!(component = "cleanup", event = "removal_deferred", path = %rel, "file busy, removal deferred");
            // The source already moved past this file; the retry picks another.
            // A plain removal is dropped, the next clean of the folder reconsiders it.
            if let Some(source) = source {
                self.queue
                    .append(WorkItem::remove_candidate(folder_rel, folder_phys, source));
            }
            return Ok(());
        }
        outcome
    }

    fn remove_locked(&self, rel: &str, phys: &Path) -> Result<()> {
        match fs::symlink_metadata(phys) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.index.set_meta(rel, None);
                Counters::inc(&self.counters.already_gone);
                return Ok(());
            }
            Err(e) => return Err(CleanupError::io(phys, e)),
        }

        // Forget the entry first: a miss is always safe, a stale hit is not.
        self.index.set_meta(rel, None);

        match fs::remove_file(phys) {
            Ok(()) => {
                Counters::inc(&self.counters.removed_files);
                trace!(component = "cleanup", event = "removed", path = %rel, "file removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Counters::inc(&self.counters.already_gone);
                Ok(())
            }
            Err(e) if is_contention(&e) => {
                Counters::inc(&self.counters.failed_removals);
                debug!(component = "cleanup", event = "removal_refused", path = %rel, error = %e, "file in use, skipped");
                Ok(())
            }
            Err(e) => {
                Counters::inc(&self.counters.failed_removals);
                Err(CleanupError::io(phys, e))
            }
        }
    }

    fn flush_accessed_date(&self, item: WorkItem) -> Result<()> {
        let Some(meta) = self.index.get_meta(&item.relative_path) else {
            return Ok(());
        };
        match set_accessed(&item.physical_path, meta.accessed_at) {
            Ok(()) => {
                Counters::inc(&self.counters.flushed_dates);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound || is_contention(&e) => Ok(()),
            Err(e) => Err(CleanupError::io(item.physical_path, e)),
        }
    }

    fn advise_more_shards(&self, rel: &str, count: usize) {
        {
            let mut last = self.last_advisory.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.advisory_interval {
                    return;
                }
            }
            *last = Some(Instant::now());
        }
        self.issues.report(
            Issue::new(
                Severity::Warning,
                SOURCE,
                "cache folders exceed the maximum item count; consider more subfolders",
            )
            .with_details(format!(
                "folder {:?} holds {} files (target {}, max {}); raise the number of shards",
                rel, count, self.policy.target_items_per_folder, self.policy.max_items_per_folder
            )),
        );
    }
}

fn set_accessed(phys: &Path, at: SystemTime) -> io::Result<()> {
    let file = File::options().write(true).open(phys)?;
    file.set_times(FileTimes::new().set_accessed(at))
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
