//! End-to-end runs of the background worker over real temporary folders.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::cleanup::{CleanupFacade, Collaborators, SchedulerState};
    use crate::config::new_test_config;
    use crate::index::{FsIndex, KeyedPathLock};
    use crate::issues::{IssueLog, Severity};
    use crate::lock::{FileProcessLock, ProcessLock};
    use crate::tests::support::{
        aged_files, count_files, init_test_logging, wait_until, write_files, FakeIndex, FakePathLock,
        FakeProcessLock, PanickingSink,
    };

    const PATIENCE: Duration = Duration::from_secs(5);

    fn on_disk(process_lock: Arc<dyn ProcessLock>, issues: Arc<IssueLog>) -> Collaborators {
        Collaborators {
            index: Arc::new(FsIndex::new()),
            path_lock: Arc::new(KeyedPathLock::new()),
            process_lock,
            issues,
        }
    }

    fn five_hours() -> Duration {
        Duration::from_secs(5 * 3600)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_cache_is_trimmed_to_target() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ab");
        write_files(&folder, &aged_files(12, five_hours()));

        let issues = Arc::new(IssueLog::new());
        let f = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(Arc::new(FakeProcessLock::free()), issues.clone()),
        )
        .unwrap();
        f.start();
        f.report_cache_outcome("ab/new.jpg", false);

        assert!(wait_until(PATIENCE, || count_files(&folder) == 5).await);
        assert!(wait_until(PATIENCE, || f.stats().removed_files == 7).await);
        // Oldest files go first.
        assert!(!folder.join("f00").exists());
        assert!(folder.join("f11").exists());
        assert_eq!(issues.count(Severity::Error), 0);

        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_constant_traffic_does_not_starve_cleanup() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ab");
        write_files(&folder, &aged_files(12, five_hours()));

        let f = Arc::new(
            CleanupFacade::new(
                &new_test_config(),
                dir.path(),
                on_disk(Arc::new(FakeProcessLock::free()), Arc::new(IssueLog::new())),
            )
            .unwrap(),
        );
        f.start();

        // Hits every few milliseconds keep the cache from ever looking quiet.
        let traffic = {
            let f = f.clone();
            tokio::spawn(async move {
                let until = Instant::now() + PATIENCE;
                while Instant::now() < until {
                    f.report_cache_outcome("ab/f11", true);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };
        f.report_cache_outcome("ab/new.jpg", false);

        assert!(wait_until(PATIENCE, || count_files(&folder) == 5).await);
        traffic.abort();
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stands_by_while_another_process_owns_cleanup() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ab");
        write_files(&folder, &aged_files(12, five_hours()));

        let lock = Arc::new(FakeProcessLock::owned_elsewhere());
        let f = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(lock.clone(), Arc::new(IssueLog::new())),
        )
        .unwrap();
        f.start();

        f.report_cache_outcome("ab/new.jpg", false);
        // The owner's worker is authoritative: local work is dropped.
        assert!(wait_until(PATIENCE, || f.queue_len() == 0).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count_files(&folder), 12);
        assert_eq!(f.state(), Some(SchedulerState::AwaitingCrossProcessLock));
        assert!(f.other_process_owns_cleanup());

        lock.make_available();
        assert!(wait_until(PATIENCE, || f.state() == Some(SchedulerState::Idle)).await);
        assert!(lock.is_held());
        assert!(!f.other_process_owns_cleanup());

        f.report_cache_outcome("ab/new.jpg", false);
        assert!(wait_until(PATIENCE, || count_files(&folder) == 5).await);
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_standby_polls_at_a_bounded_rate() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = new_test_config();
        cfg.process_lock_wait = Duration::from_millis(1);

        let lock = Arc::new(FakeProcessLock::owned_elsewhere());
        let f = CleanupFacade::new(&cfg, dir.path(), on_disk(lock.clone(), Arc::new(IssueLog::new())))
            .unwrap();
        f.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Two attempts per round, one round every 25ms at most.
        let attempts = lock.attempts();
        assert!(attempts > 0);
        assert!(attempts < 40, "{attempts} lock attempts in 200ms");
        assert!(f.other_process_owns_cleanup());
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_work_starts_within_idle_gap_plus_slice() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ab");
        write_files(&folder, &aged_files(12, five_hours()));

        let cfg = new_test_config();
        let f = CleanupFacade::new(
            &cfg,
            dir.path(),
            on_disk(Arc::new(FakeProcessLock::free()), Arc::new(IssueLog::new())),
        )
        .unwrap();
        f.start();
        assert!(wait_until(PATIENCE, || f.state() == Some(SchedulerState::Idle)).await);
        tokio::time::sleep(cfg.min_idle_gap * 3).await;

        let reported = Instant::now();
        f.report_cache_outcome("ab/new.jpg", false);
        assert!(wait_until(PATIENCE, || f.stats().work_slices >= 1).await);

        let bound = cfg.min_idle_gap + cfg.optimal_work_slice + Duration::from_millis(250);
        assert!(reported.elapsed() <= bound, "first slice after {:?}", reported.elapsed());
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_huge_starvation_gap_still_cleans_when_quiet() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let ab = dir.path().join("ab");
        let cd = dir.path().join("cd");
        write_files(&ab, &aged_files(12, five_hours()));
        write_files(&cd, &aged_files(12, five_hours()));

        let mut cfg = new_test_config();
        cfg.max_starvation_gap = Duration::from_secs(u64::MAX / 2);
        let f = CleanupFacade::new(
            &cfg,
            dir.path(),
            on_disk(Arc::new(FakeProcessLock::free()), Arc::new(IssueLog::new())),
        )
        .unwrap();
        f.start();
        assert!(wait_until(PATIENCE, || f.state() == Some(SchedulerState::Idle)).await);

        // Busy: the worker computes its wait against the starvation gap.
        f.report_cache_outcome("ab/f11", true);
        f.report_cache_outcome("ab/new.jpg", false);
        tokio::time::sleep(cfg.min_idle_gap * 5).await;
        assert!(f.standing_issues().is_empty());

        // Quiet by now; the next insertion gets everything done.
        f.report_cache_outcome("cd/new.jpg", false);
        assert!(wait_until(PATIENCE, || count_files(&ab) == 5 && count_files(&cd) == 5).await);
        assert!(f.standing_issues().is_empty());
        assert_ne!(f.state(), Some(SchedulerState::Stopped));
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_in_worker_loop_becomes_standing_issue() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let issues = Arc::new(IssueLog::new());
        let f = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(Arc::new(FakeProcessLock::panicking()), issues.clone()),
        )
        .unwrap();
        f.start();

        assert!(wait_until(PATIENCE, || issues.count(Severity::Critical) == 1).await);
        assert_eq!(f.state(), Some(SchedulerState::Stopped));
        assert_eq!(f.standing_issues().len(), 1);
        let died = issues
            .snapshot()
            .into_iter()
            .find(|i| i.severity == Severity::Critical)
            .unwrap();
        assert!(died.details.unwrap_or_default().contains("lock backend exploded"));
        f.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_instance_takes_over_after_first_shuts_down() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let locks = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ab");
        write_files(&folder, &aged_files(12, five_hours()));

        let first_lock = Arc::new(FileProcessLock::in_dir(locks.path(), dir.path()));
        let first = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(first_lock.clone(), Arc::new(IssueLog::new())),
        )
        .unwrap();
        first.start();
        assert!(wait_until(PATIENCE, || first_lock.is_held()).await);

        let second_lock = Arc::new(FileProcessLock::in_dir(locks.path(), dir.path()));
        let second = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(second_lock.clone(), Arc::new(IssueLog::new())),
        )
        .unwrap();
        second.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second_lock.is_held());
        assert_eq!(second.state(), Some(SchedulerState::AwaitingCrossProcessLock));

        first.shutdown().await;
        assert!(!first_lock.is_held());
        assert!(wait_until(PATIENCE, || second_lock.is_held()).await);
        assert!(wait_until(PATIENCE, || second.state() == Some(SchedulerState::Idle)).await);

        second.report_cache_outcome("ab/new.jpg", false);
        assert!(wait_until(PATIENCE, || count_files(&folder) == 5).await);
        second.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_releases_lock_and_stops() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(FakeProcessLock::free());
        let f = CleanupFacade::new(
            &new_test_config(),
            dir.path(),
            on_disk(lock.clone(), Arc::new(IssueLog::new())),
        )
        .unwrap();
        f.start();
        assert!(wait_until(PATIENCE, || lock.is_held()).await);

        f.shutdown().await;
        assert!(!lock.is_held());
        assert_eq!(f.state(), Some(SchedulerState::Stopped));

        // Reports after shutdown are harmless.
        f.report_cache_outcome("ab/x.jpg", false);
        f.start();
        assert_eq!(f.state(), Some(SchedulerState::Stopped));
        assert!(!lock.is_held());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dead_worker_becomes_standing_issue() {
        init_test_logging();
        let index = Arc::new(FakeIndex::new());
        index.fail_populate_of("ab");
        let lock = Arc::new(FakeProcessLock::free());
        let sink = Arc::new(PanickingSink::default());

        let f = CleanupFacade::new(
            &new_test_config(),
            "/cache",
            Collaborators {
                index,
                path_lock: Arc::new(FakePathLock::new()),
                process_lock: lock.clone(),
                issues: sink.clone(),
            },
        )
        .unwrap();
        f.start();
        // The failed populate is reported as an error, and the sink panics
        // on errors, which takes the worker down.
        f.report_cache_outcome("ab/x.jpg", false);

        assert!(wait_until(PATIENCE, || sink.count(Severity::Critical) == 1).await);
        assert_eq!(f.standing_issues().len(), 1);
        assert_eq!(f.state(), Some(SchedulerState::Stopped));
        assert!(!lock.is_held());

        // Later reports bring the standing issue back up, rate limited.
        f.report_cache_outcome("cd/x.jpg", true);
        f.report_cache_outcome("cd/y.jpg", true);
        assert_eq!(sink.count(Severity::Critical), 2);

        f.shutdown().await;
    }
}
