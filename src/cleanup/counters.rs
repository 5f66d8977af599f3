//! Counters for cleanup statistics.
//

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters, bumped by the worker.
#[derive(Debug, Default)]
pub struct Counters {
    pub removed_files: AtomicU64,
    pub already_gone: AtomicU64,
    pub deferred_removals: AtomicU64,
    pub failed_removals: AtomicU64,
    pub exhausted_sources: AtomicU64,
    pub populated_folders: AtomicU64,
    pub cleaned_folders: AtomicU64,
    pub flushed_dates: AtomicU64,
    pub task_failures: AtomicU64,
    pub work_slices: AtomicU64,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed_files: u64,
    pub already_gone: u64,
    pub deferred_removals: u64,
    pub failed_removals: u64,
    pub exhausted_sources: u64,
    pub populated_folders: u64,
    pub cleaned_folders: u64,
    pub flushed_dates: u64,
    pub task_failures: u64,
    pub work_slices: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CleanupStats {
        CleanupStats {
            removed_files: self.removed_files.load(Ordering::Relaxed),
            already_gone: self.already_gone.load(Ordering::Relaxed),
            deferred_removals: self.deferred_removals.load(Ordering::Relaxed),
            failed_removals: self.failed_removals.load(Ordering::Relaxed),
            exhausted_sources: self.exhausted_sources.load(Ordering::Relaxed),
            populated_folders: self.populated_folders.load(Ordering::Relaxed),
            cleaned_folders: self.cleaned_folders.load(Ordering::Relaxed),
            flushed_dates: self.flushed_dates.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            work_slices: self.work_slices.load(Ordering::Relaxed),
        }
    }
}

impl CleanupStats {
    /// Growth since `prev`.
    pub fn since(&self, prev: &CleanupStats) -> CleanupStats {
        CleanupStats {
            removed_files: self.removed_files.saturating_sub(prev.removed_files),
            already_gone: self.already_gone.saturating_sub(prev.already_gone),
            deferred_removals: self.deferred_removals.saturating_sub(prev.deferred_removals),
            failed_removals: self.failed_removals.saturating_sub(prev.failed_removals),
            exhausted_sources: self.exhausted_sources.saturating_sub(prev.exhausted_sources),
            populated_folders: self.populated_folders.saturating_sub(prev.populated_folders),
            cleaned_folders: self.cleaned_folders.saturating_sub(prev.cleaned_folders),
            flushed_dates: self.flushed_dates.saturating_sub(prev.flushed_dates),
            task_failures: self.task_failures.saturating_sub(prev.task_failures),
            work_slices: self.work_slices.saturating_sub(prev.work_slices),
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == CleanupStats::default()
    }
}
