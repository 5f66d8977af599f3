// Entry points the rest of the cache calls to drive cleanup.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::counters::{CleanupStats, Counters};
use super::item::{WorkItem, WorkKind};
use super::policy::EvictionPolicy;
use super::queue::WorkQueue;
use super::scheduler::{CleanupScheduler, SchedulerState};
use super::tasks::TaskRunner;
use crate::config::CleanupConfig;
use crate::error::CleanupError;
use crate::index::{path, FolderIndex, FsIndex, KeyedPathLock, PathLock};
use crate::issues::{Issue, IssueSink};
use crate::lock::{FileProcessLock, ProcessLock};

/// Everything the cleanup engine needs from the surrounding cache.
#[derive(Clone)]
pub struct Collaborators {
    pub index: Arc<dyn FolderIndex>,
    pub path_lock: Arc<dyn PathLock>,
    pub process_lock: Arc<dyn ProcessLock>,
    pub issues: Arc<dyn IssueSink>,
}

impl Collaborators {
    /// Filesystem-backed defaults for a cache rooted at `cache_root`.
    pub fn filesystem(cache_root: &Path, issues: Arc<dyn IssueSink>) -> Self {
        Self {
            index: Arc::new(FsIndex::new()),
            path_lock: Arc::new(KeyedPathLock::new()),
            process_lock: Arc::new(FileProcessLock::for_cache_root(cache_root)),
            issues,
        }
    }
}

/// Public seam of the cleanup engine.
///
/// All methods only touch the queue and a few flags, so they are safe to
/// call from request threads.
pub struct CleanupFacade {
    root: PathBuf,
    queue: Arc<WorkQueue>,
    counters: Arc<Counters>,
    issues: Arc<dyn IssueSink>,
    scheduler: Option<Arc<CleanupScheduler>>,
    advisory_interval: Duration,
    last_standing_report: Mutex<Option<Instant>>,
}

impl CleanupFacade {
    /// Builds the engine. Nothing runs until [`start`](Self::start).
    pub fn new(
        cfg: &CleanupConfig,
        cache_root: impl Into<PathBuf>,
        collaborators: Collaborators,
    ) -> Result<Self, CleanupError> {
        cfg.validate()?;
        let root = cache_root.into();
        let queue = Arc::new(WorkQueue::new());
        let counters = Arc::new(Counters::new());

        let scheduler = if cfg.enabled {
            let runner = Arc::new(TaskRunner::new(
                queue.clone(),
                collaborators.index,
                collaborators.path_lock,
                collaborators.issues.clone(),
                Arc::new(EvictionPolicy::from_config(cfg)),
                counters.clone(),
                cfg.file_lock_timeout,
                cfg.advisory_interval,
            ));
            Some(CleanupScheduler::new(
                format!("cleanup:{}", root.display()),
                cfg,
                queue.clone(),
                runner,
                collaborators.process_lock,
                collaborators.issues.clone(),
                counters.clone(),
            ))
        } else {
            info!(component = "cleanup", event = "disabled", root = ?root, "cache cleanup is disabled");
            None
        };

        Ok(Self {
            root,
            queue,
            counters,
            issues: collaborators.issues,
            scheduler,
            advisory_interval: cfg.advisory_interval,
            last_standing_report: Mutex::new(None),
        })
    }

    /// Starts the background worker. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.start();
        }
    }

    /// Called after every cache lookup. Hits mark the cache busy; misses
    /// schedule a clean of the folder the new file lands in.
    pub fn report_cache_outcome(&self, relative_path: &str, was_hit: bool) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        self.resurface_standing_issues(scheduler);

        if was_hit {
            scheduler.notify_busy();
            return;
        }

        let folder = path::parent(relative_path);
        self.queue.append_unique(WorkItem::new(
            WorkKind::CleanFolderRecursive,
            folder,
            path::physical(&self.root, folder),
        ));
    }

    /// A cached file vanished behind the cache's back. Queued work may rely
    /// on listings that are no longer true, so start over from the root.
    pub fn report_structural_anomaly(&self) {
        if self.scheduler.is_none() {
            return;
        }
        warn!(component = "cleanup", event = "structural_anomaly", root = ?self.root, "restarting cleanup from the cache root");
        self.queue.replace_all_with(self.root_clean());
    }

    /// Administrative full sweep of the cache.
    pub fn force_full_clean(&self) {
        if let Some(scheduler) = &self.scheduler {
            self.resurface_standing_issues(scheduler);
            info!(component = "cleanup", event = "full_clean", root = ?self.root, "full cleanup requested");
            self.queue.replace_all_with(self.root_clean());
        }
    }

    /// Stops the worker and releases the cross-process lock.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.root
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> CleanupStats {
        self.counters.snapshot()
    }

    /// `None` when cleanup is disabled.
    pub fn state(&self) -> Option<SchedulerState> {
        self.scheduler.as_ref().map(|s| s.state())
    }

    /// True while another process holds cleanup for this cache root.
    pub fn other_process_owns_cleanup(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(|s| s.other_process_owns_cleanup())
    }

    pub fn standing_issues(&self) -> Vec<Issue> {
        self.scheduler
            .as_ref()
            .map(|s| s.standing_issues())
            .unwrap_or_default()
    }

    fn root_clean(&self) -> WorkItem {
        WorkItem::new(WorkKind::CleanFolderRecursive, "", self.root.clone())
    }

    fn resurface_standing_issues(&self, scheduler: &CleanupScheduler) {
        if !scheduler.is_dead() {
            return;
        }
        {
            let mut last = self.last_standing_report.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.advisory_interval {
                    return;
                }
            }
            *last = Some(Instant::now());
        }
        for issue in scheduler.standing_issues() {
            self.issues.report(issue);
        }
    }
}
