// Periodic cleanup statistics: metrics export and one log line per period.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::counters::{CleanupStats, Counters};
use super::queue::WorkQueue;

pub const REMOVED_FILES: &str = "cleanup_removed_files_total";
pub const ALREADY_GONE: &str = "cleanup_already_gone_total";
pub const DEFERRED_REMOVALS: &str = "cleanup_deferred_removals_total";
pub const FAILED_REMOVALS: &str = "cleanup_failed_removals_total";
pub const EXHAUSTED_SOURCES: &str = "cleanup_exhausted_sources_total";
pub const POPULATED_FOLDERS: &str = "cleanup_populated_folders_total";
pub const CLEANED_FOLDERS: &str = "cleanup_cleaned_folders_total";
pub const FLUSHED_DATES: &str = "cleanup_flushed_dates_total";
pub const TASK_FAILURES: &str = "cleanup_task_failures_total";
pub const WORK_SLICES: &str = "cleanup_work_slices_total";
pub const QUEUE_LENGTH: &str = "cleanup_queue_length";

/// Publishes one period's growth through the metrics facade.
pub fn publish(delta: &CleanupStats, queue_len: usize) {
    metrics::counter!(REMOVED_FILES).increment(delta.removed_files);
    metrics::counter!(ALREADY_GONE).increment(delta.already_gone);
    metrics::counter!(DEFERRED_REMOVALS).increment(delta.deferred_removals);
    metrics::counter!(FAILED_REMOVALS).increment(delta.failed_removals);
    metrics::counter!(EXHAUSTED_SOURCES).increment(delta.exhausted_sources);
    metrics::counter!(POPULATED_FOLDERS).increment(delta.populated_folders);
    metrics::counter!(CLEANED_FOLDERS).increment(delta.cleaned_folders);
    metrics::counter!(FLUSHED_DATES).increment(delta.flushed_dates);
    metrics::counter!(TASK_FAILURES).increment(delta.task_failures);
    metrics::counter!(WORK_SLICES).increment(delta.work_slices);
    metrics::gauge!(QUEUE_LENGTH).set(queue_len as f64);
}

/// Telemetry logger for the cleanup worker.
pub async fn logger(
    shutdown_token: CancellationToken,
    name: String,
    counters: Arc<Counters>,
    queue: Arc<WorkQueue>,
    each: Duration,
) {
    let mut ticker = tokio::time::interval(each.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut prev = counters.snapshot();

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                tracing::debug!(component = "cleanup", name = %name, "stats logger stopped");
                return;
            }
            _ = ticker.tick() => {
                let cur = counters.snapshot();
                let delta = cur.since(&prev);
                prev = cur;
                let queued = queue.len();

                publish(&delta, queued);

                if !delta.is_idle() {
                    tracing::info!(
                        component = "cleanup",
                        name = %name,
                        removed = delta.removed_files,
                        already_gone = delta.already_gone,
                        deferred = delta.deferred_removals,
                        failed = delta.failed_removals,
                        exhausted = delta.exhausted_sources,
                        populated = delta.populated_folders,
                        cleaned = delta.cleaned_folders,
                        flushed = delta.flushed_dates,
                        task_failures = delta.task_failures,
                        slices = delta.work_slices,
                        queued,
                        "cleanup statistics"
                    );
                }
            }
        }
    }
}
