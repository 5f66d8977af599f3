// Background worker that drains the cleanup queue when the cache is quiet.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::counters::Counters;
use super::policy::EvictionPolicy;
use super::queue::WorkQueue;
use super::tasks::{self, TaskRunner};
use super::telemetry;
use crate::config::CleanupConfig;
use crate::error::CleanupError;
use crate::issues::{Issue, IssueSink, Severity};
use crate::lock::ProcessLock;

/// Extra wait on top of the computed eligibility time.
const SAFETY_MARGIN: Duration = Duration::from_millis(50);

/// Minimum spacing of cross-process lock attempts while another process
/// owns cleanup.
const STANDBY_POLL: Duration = Duration::from_millis(25);

/// Stand-in for "never" when a configured gap does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

const WORKER_DIED: &str = "cleanup worker died; the cache will grow until the process restarts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started yet, or waiting for another process to give up cleanup.
    AwaitingCrossProcessLock,
    Working,
    Idle,
    ShuttingDown,
    Stopped,
}

struct Times {
    last_busy_at: Instant,
    last_worked_at: Instant,
}

/// Mutable run state, each part behind its own small lock or atomic.
struct RunState {
    times: Mutex<Times>,
    phase: Mutex<SchedulerState>,
    other_process_owns_cleanup: AtomicBool,
    dead: AtomicBool,
}

/// Timing knobs read by the loop.
#[derive(Debug, Clone)]
struct Timings {
    process_lock_wait: Duration,
    process_lock_retry_delay: Duration,
    stats_interval: Duration,
}

/// Single background worker per cache instance.
///
/// Holds the cross-process lock for as long as it runs once acquired.
pub struct CleanupScheduler {
    name: String,
    queue: Arc<WorkQueue>,
    runner: Arc<TaskRunner>,
    policy: Arc<EvictionPolicy>,
    process_lock: Arc<dyn ProcessLock>,
    issues: Arc<dyn IssueSink>,
    counters: Arc<Counters>,
    timings: Timings,
    state: RunState,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupScheduler {
    pub fn new(
        name: String,
        cfg: &CleanupConfig,
        queue: Arc<WorkQueue>,
        runner: Arc<TaskRunner>,
        process_lock: Arc<dyn ProcessLock>,
        issues: Arc<dyn IssueSink>,
        counters: Arc<Counters>,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            name,
            queue,
            runner,
            policy: Arc::new(EvictionPolicy::from_config(cfg)),
            process_lock,
            issues,
            counters,
            timings: Timings {
                process_lock_wait: cfg.process_lock_wait,
                process_lock_retry_delay: cfg.process_lock_retry_delay,
                stats_interval: cfg.stats_interval,
            },
            state: RunState {
                times: Mutex::new(Times {
                    last_busy_at: now,
                    last_worked_at: now,
                }),
                phase: Mutex::new(SchedulerState::AwaitingCrossProcessLock),
                other_process_owns_cleanup: AtomicBool::new(false),
                dead: AtomicBool::new(false),
            },
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// Spawns the loop and its stats logger on the current tokio runtime.
    /// Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.shutdown.is_cancelled() {
            return;
        }

        let stats_token = self.shutdown.clone();
        let name = self.name.clone();
        let counters = self.counters.clone();
        let queue = self.queue.clone();
        let each = self.timings.stats_interval;
        tokio::task::spawn(async move {
            telemetry::logger(stats_token, name, counters, queue, each).await;
        });

        // The loop runs in its own task so a panic anywhere in it is seen
        // here and turned into a dead worker instead of vanishing.
        let this = self.clone();
        *handle = Some(tokio::task::spawn(async move {
            let worker = this.clone();
            if let Err(e) = tokio::task::spawn(async move { worker.run().await }).await {
                if let Ok(payload) = e.try_into_panic() {
                    this.die(CleanupError::TaskPanicked(tasks::panic_message(&*payload)));
                }
            }
        }));
    }

    /// Records request traffic; cleanup backs off while this keeps coming.
    pub fn notify_busy(&self) {
        self.state.times.lock().last_busy_at = Instant::now();
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.phase.lock()
    }

    pub fn other_process_owns_cleanup(&self) -> bool {
        self.state.other_process_owns_cleanup.load(Ordering::Relaxed)
    }

    pub fn is_dead(&self) -> bool {
        self.state.dead.load(Ordering::Relaxed)
    }

    /// Issues that stay true until the process restarts.
    pub fn standing_issues(&self) -> Vec<Issue> {
        if self.is_dead() {
            vec![Issue::new(Severity::Critical, "cleanup", WORKER_DIED)]
        } else {
            Vec::new()
        }
    }

    /// Stops the loop, waits for it and releases the cross-process lock.
    pub async fn shutdown(&self) {
        self.set_phase(SchedulerState::ShuttingDown);
        self.shutdown.cancel();
        self.queue.wake();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(component = "cleanup", name = %self.name, error = %e, "cleanup loop ended abnormally");
            }
        }

        self.process_lock.release();
        self.set_phase(SchedulerState::Stopped);
        info!(component = "cleanup", name = %self.name, event = "stopped", "cleanup worker stopped");
    }

    fn set_phase(&self, phase: SchedulerState) {
        let mut cur = self.state.phase.lock();
        // Once shutdown starts the loop may not flip back to a running phase.
        if matches!(*cur, SchedulerState::ShuttingDown | SchedulerState::Stopped)
            && !matches!(phase, SchedulerState::Stopped)
        {
            return;
        }
        *cur = phase;
    }

    async fn run(self: Arc<Self>) {
        info!(
            component = "cleanup",
            name = %self.name,
            event = "starting",
            startup_delay = %humantime::format_duration(self.policy.startup_delay),
            "cleanup worker starting"
        );

        if !self.sleep_or_shutdown(self.policy.startup_delay).await {
            return;
        }
        if !self.acquire_process_lock().await {
            return;
        }

        while !self.shutdown.is_cancelled() {
            let now = Instant::now();
            let (starved, quiet) = self.eligibility(now);

            let mut spent = Duration::ZERO;
            if (starved || quiet) && !self.queue.is_empty() {
                self.set_phase(SchedulerState::Working);
                let started = Instant::now();
                match self.work_slice(after(started, self.policy.optimal_work_slice)).await {
                    Ok(processed) => {
                        spent = started.elapsed();
                        debug!(
                            component = "cleanup",
                            name = %self.name,
                            event = "slice_done",
                            processed,
                            spent_ms = spent.as_millis() as u64,
                            starved,
                            quiet,
                            "work slice finished"
                        );
                    }
                    Err(e) => {
                        self.die(e);
                        return;
                    }
                }
                self.state.times.lock().last_worked_at = Instant::now();
                // Drop the wake-up left by the slice's own insertions; the
                // emptiness check below still sees anything queued meanwhile.
                let _ = tokio::time::timeout(Duration::ZERO, self.queue.notified()).await;
            }
            self.set_phase(SchedulerState::Idle);

            let wait = self.next_wait(Instant::now(), quiet, spent);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.queue.notified() => {}
                _ = sleep_for(wait) => {}
            }
        }
    }

    /// (starved, quiet) at `now`.
    fn eligibility(&self, now: Instant) -> (bool, bool) {
        let times = self.state.times.lock();
        let starved = now.saturating_duration_since(times.last_worked_at) > self.policy.max_starvation_gap;
        let quiet = now.saturating_duration_since(times.last_busy_at) > self.policy.min_idle_gap;
        (starved, quiet)
    }

    /// How long to sleep before re-evaluating; `None` means until woken.
    fn next_wait(&self, now: Instant, quiet: bool, spent: Duration) -> Option<Duration> {
        if self.queue.is_empty() {
            return None;
        }
        if quiet {
            // Keeps cleanup near half of the wall clock while idle.
            return Some(self.policy.optimal_work_slice.max(spent));
        }
        let times = self.state.times.lock();
        let quiet_at = after(times.last_busy_at, self.policy.min_idle_gap);
        let starved_at = after(times.last_worked_at, self.policy.max_starvation_gap);
        Some(quiet_at.max(starved_at).saturating_duration_since(now) + SAFETY_MARGIN)
    }

    async fn work_slice(&self, deadline: Instant) -> Result<usize, CleanupError> {
        Counters::inc(&self.counters.work_slices);
        let runner = self.runner.clone();
        let token = self.shutdown.clone();
        tokio::task::spawn_blocking(move || runner.drain(deadline, &token))
            .await
            .map_err(|e| CleanupError::WorkerJoin(e.to_string()))
    }

    /// Waits until this process owns cleanup for the cache. False on shutdown.
    async fn acquire_process_lock(&self) -> bool {
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }

            let attempt = match self.process_lock.try_acquire() {
                Ok(true) => Ok(true),
                Ok(false) => {
                    self.mark_other_owner();
                    let lock = self.process_lock.clone();
                    let wait = self.timings.process_lock_wait;
                    let started = Instant::now();
                    let res = match tokio::task::spawn_blocking(move || lock.wait_release(wait)).await {
                        Ok(res) => res,
                        Err(e) => Err(std::io::Error::other(e.to_string())),
                    };
                    if matches!(res, Ok(false)) {
                        let rest = STANDBY_POLL.saturating_sub(started.elapsed());
                        if !self.sleep_or_shutdown(rest).await {
                            return false;
                        }
                    }
                    res
                }
                Err(e) => Err(e),
            };

            match attempt {
                Ok(true) => {
                    if self.shutdown.is_cancelled() {
                        self.process_lock.release();
                        return false;
                    }
                    self.state.other_process_owns_cleanup.store(false, Ordering::Relaxed);
                    self.set_phase(SchedulerState::Idle);
                    info!(component = "cleanup", name = %self.name, event = "lock_acquired", "this process now owns cache cleanup");
                    return true;
                }
                Ok(false) => {
                    // The owner is authoritative; local work would be duplicated.
                    self.queue.clear();
                }
                Err(e) => {
                    self.queue.clear();
                    warn!(
                        component = "cleanup",
                        name = %self.name,
                        event = "lock_error",
                        error = %CleanupError::ProcessLock(e),
                        "cross-process lock unavailable, retrying later"
                    );
                    if !self.sleep_or_shutdown(self.timings.process_lock_retry_delay).await {
                        return false;
                    }
                }
            }
        }
    }

    fn mark_other_owner(&self) {
        if !self.state.other_process_owns_cleanup.swap(true, Ordering::Relaxed) {
            info!(component = "cleanup", name = %self.name, event = "lock_busy", "another process owns cache cleanup, standing by");
        }
        self.set_phase(SchedulerState::AwaitingCrossProcessLock);
        self.queue.clear();
    }

    async fn sleep_or_shutdown(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.shutdown.is_cancelled();
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }

    fn die(&self, err: CleanupError) {
        self.state.dead.store(true, Ordering::Relaxed);
        self.process_lock.release();
        self.set_phase(SchedulerState::Stopped);
        error!(component = "cleanup", name = %self.name, event = "worker_died", error = %err, "{}", WORKER_DIED);
        self.issues.report(
            Issue::new(Severity::Critical, "cleanup", WORKER_DIED).with_details(err.to_string()),
        );
    }
}

/// `at + d`, or far in the future when that does not fit.
fn after(at: Instant, d: Duration) -> Instant {
    at.checked_add(d)
        .or_else(|| at.checked_add(FAR_FUTURE))
        .unwrap_or(at)
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
