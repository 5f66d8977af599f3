use super::{CleanupConfig, Logs};
use std::time::Duration;

/// Creates a configuration with millisecond-scale timings.
pub fn new_test_config() -> CleanupConfig {
    CleanupConfig {
        env: super::TEST.to_string(),
        enabled: true,
        logs: Some(Logs {
            level: Some("debug".to_string()),
        }),
        startup_delay: Duration::ZERO,
        min_idle_gap: Duration::from_millis(10),
        max_starvation_gap: Duration::from_millis(50),
        optimal_work_slice: Duration::from_millis(50),
        target_items_per_folder: 5,
        max_items_per_folder: 10,
        avoid_removal_if_used_within: Duration::from_secs(60 * 60),
        avoid_removal_if_created_within: Duration::from_secs(60 * 60),
        prohibit_removal_if_used_within: Duration::from_secs(60),
        prohibit_removal_if_created_within: Duration::from_secs(60),
        file_lock_timeout: Duration::from_millis(5),
        process_lock_wait: Duration::from_millis(20),
        process_lock_retry_delay: Duration::from_millis(20),
        stats_interval: Duration::from_secs(1),
        advisory_interval: Duration::from_secs(60),
    }
}
