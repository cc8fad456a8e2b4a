//! WorkerPool: N slots that pop job IDs and run them to an outcome.
//!
//! Per slot:
//!   pop -> claim (queued -> running) -> execute with timeout -> decide -> settle
//!   -> requeue at the tail if the outcome was retryable
//!
//! The store is the only place job state changes. A popped entry whose
//! record is no longer `queued` (already terminal, purged, cancelled) is
//! dropped without running. A queued record whose attempt budget is already
//! spent is failed at claim time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::domain::{AttemptResult, Decider, ExecutorError, JobArgs, JobStatus, StoreError};
use crate::ports::{Clock, JobQueue, JobStore, LifecycleHooks, QueueEntry, TaskExecutor};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent slots.
    pub concurrency: usize,

    /// How long a slot blocks on `pop` before re-checking for shutdown.
    pub pop_timeout: Duration,

    /// Pause after a backend error before the slot polls again.
    pub error_backoff: Duration,

    /// Graceful drain deadline. Slots still busy after this are aborted.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            pop_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Everything a slot needs. Shared by all slots of a pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub executor: Arc<dyn TaskExecutor>,
    pub decider: Arc<dyn Decider>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The grace period elapsed and remaining slots were aborted.
    pub forced: bool,

    /// Slots that were still running at the deadline.
    pub aborted_slots: usize,
}

/// Running worker pool.
///
/// - `request_shutdown()` stops slots from taking new jobs
/// - `shutdown()` waits for in-flight jobs up to the grace period, then aborts
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    slots: JoinSet<()>,
    in_flight: Arc<AtomicUsize>,
    hooks: Arc<dyn LifecycleHooks>,
    shutdown_grace: Duration,
}

impl WorkerPool {
    /// Run the startup hook, then spawn `config.concurrency` slots.
    pub async fn start(
        deps: WorkerDeps,
        config: PoolConfig,
        hooks: Arc<dyn LifecycleHooks>,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        hooks.on_startup(concurrency).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let ctx = Arc::new(SlotContext {
            deps,
            in_flight: Arc::clone(&in_flight),
            pop_timeout: config.pop_timeout,
            error_backoff: config.error_backoff,
        });

        let mut slots = JoinSet::new();
        for slot in 0..concurrency {
            let ctx = Arc::clone(&ctx);
            let rx = shutdown_rx.clone();
            slots.spawn(async move { slot_loop(slot, ctx, rx).await });
        }

        Self {
            shutdown_tx,
            slots,
            in_flight,
            hooks,
            shutdown_grace: config.shutdown_grace,
        }
    }

    /// Jobs currently owned by a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop taking jobs, drain, and run the shutdown hook.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.request_shutdown();
        let deadline = tokio::time::Instant::now() + self.shutdown_grace;

        let mut forced = false;
        loop {
            match tokio::time::timeout_at(deadline, self.slots.join_next()).await {
                Ok(Some(Err(err))) if err.is_panic() => {
                    tracing::error!(error = %err, "worker slot panicked");
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    forced = true;
                    break;
                }
            }
        }

        let aborted_slots = if forced {
            let remaining = self.slots.len();
            tracing::warn!(
                remaining,
                in_flight = self.in_flight(),
                grace_secs = self.shutdown_grace.as_secs_f64(),
                "shutdown grace elapsed, aborting worker slots"
            );
            self.slots.abort_all();
            while self.slots.join_next().await.is_some() {}
            remaining
        } else {
            0
        };

        self.hooks.on_shutdown(forced).await;
        ShutdownReport {
            forced,
            aborted_slots,
        }
    }
}

struct SlotContext {
    deps: WorkerDeps,
    in_flight: Arc<AtomicUsize>,
    pop_timeout: Duration,
    error_backoff: Duration,
}

/// Marks a slot busy for as long as it is alive.
///
/// Dropped on every exit path, including an aborted slot.
struct SlotGuard {
    in_flight: Arc<AtomicUsize>,
}

impl SlotGuard {
    fn acquire(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Aborts the attempt task if the slot stops awaiting it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn slot_loop(slot: usize, ctx: Arc<SlotContext>, mut shutdown: watch::Receiver<bool>) {
    tracing::debug!(slot, "worker slot started");
    loop {
        // pop is not raced against shutdown: a popped entry must not be lost
        if *shutdown.borrow() {
            break;
        }

        let entry = match ctx.deps.queue.pop(ctx.pop_timeout).await {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(slot, error = %err, "queue pop failed");
                tokio::select! {
                    _ = tokio::time::sleep(ctx.error_backoff) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        let _guard = SlotGuard::acquire(&ctx.in_flight);
        process_entry(slot, &ctx, entry).await;
    }
    tracing::debug!(slot, "worker slot stopped");
}

async fn process_entry(slot: usize, ctx: &SlotContext, entry: QueueEntry) {
    let job_id = entry.job_id;
    let deps = &ctx.deps;

    let now = deps.clock.now();
    let claimed = deps
        .store
        .update(job_id, Box::new(move |r| r.claim(now).map(|_| ())))
        .await;

    let record = match claimed {
        Ok(record) if record.status == JobStatus::Running => record,
        Ok(record) => {
            tracing::warn!(
                slot,
                %job_id,
                attempts = record.attempts,
                status = %record.status,
                "attempt budget already spent, job closed without running"
            );
            return;
        }
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(slot, %job_id, "dropping entry for unknown job");
            return;
        }
        Err(StoreError::Transition(err)) => {
            tracing::debug!(slot, %job_id, error = %err, "dropping entry for job that is not queued");
            return;
        }
        Err(err) => {
            tracing::warn!(slot, %job_id, error = %err, "could not claim job, putting it back");
            if let Err(err) = deps.queue.requeue(job_id).await {
                tracing::error!(slot, %job_id, error = %err, "requeue after failed claim failed, left to the reaper");
            }
            tokio::time::sleep(ctx.error_backoff).await;
            return;
        }
    };

    let attempt = record.attempts;
    let timeout = record.policy.attempt_timeout;
    tracing::info!(
        slot,
        %job_id,
        attempt,
        max_attempts = record.policy.max_attempts,
        "job started"
    );

    let started = Instant::now();
    let result = run_attempt(Arc::clone(&deps.executor), record.args, timeout).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let decider = Arc::clone(&deps.decider);
    let now = deps.clock.now();
    let settled = deps
        .store
        .update(
            job_id,
            Box::new(move |r| {
                let outcome = decider.decide(r, result.clone());
                r.settle_attempt(attempt, outcome, now)
            }),
        )
        .await;

    let record = match settled {
        Ok(record) => record,
        Err(StoreError::Transition(err)) => {
            // reaped while running; whoever holds it now owns the outcome
            tracing::warn!(slot, %job_id, attempt, error = %err, "discarding stale attempt result");
            return;
        }
        Err(err) => {
            tracing::error!(slot, %job_id, attempt, error = %err, "could not store attempt outcome");
            return;
        }
    };

    match record.status {
        JobStatus::Succeeded => {
            tracing::info!(slot, %job_id, attempt, duration_ms, "job succeeded");
        }
        JobStatus::Queued => {
            tracing::warn!(slot, %job_id, attempt, duration_ms, "attempt failed, requeueing");
            if let Err(err) = deps.queue.requeue(job_id).await {
                tracing::error!(slot, %job_id, error = %err, "requeue failed, left to the reaper");
            }
        }
        status => {
            let message = record.error.map(|e| e.message).unwrap_or_default();
            tracing::error!(
                slot,
                %job_id,
                attempt,
                duration_ms,
                %status,
                error = %message,
                "job finished unsuccessfully"
            );
        }
    }
}

/// Run one executor invocation in its own task.
///
/// A panic in the executor becomes a retryable error. On timeout the task
/// is aborted.
async fn run_attempt(
    executor: Arc<dyn TaskExecutor>,
    args: JobArgs,
    limit: Duration,
) -> AttemptResult {
    let mut task = AbortOnDrop(tokio::spawn(async move { executor.execute(&args).await }));

    match tokio::time::timeout(limit, &mut task.0).await {
        Ok(Ok(Ok(output))) => AttemptResult::Completed(output),
        Ok(Ok(Err(err))) => AttemptResult::Errored(err),
        Ok(Err(join_err)) => AttemptResult::Errored(ExecutorError::retryable(format!(
            "executor crashed: {join_err}"
        ))),
        Err(_) => AttemptResult::TimedOut(limit),
    }
}
