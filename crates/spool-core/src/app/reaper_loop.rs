//! ReaperLoop: recovers jobs that lost their worker or their queue entry.
//!
//! - A job whose attempt started longer ago than `attempt_timeout + grace`
//!   has lost its worker (crashed process, forced shutdown). The reaper
//!   settles that attempt as a timeout: requeued if attempts remain, else
//!   `timed_out`.
//! - A job left `queued` for longer than `grace` with no entry in the queue
//!   (failed requeue, crash between pop and claim) is pushed again, or
//!   failed if its attempt budget is spent.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::{
    AttemptResult, BackendError, Decider, JobId, JobRecord, JobStatus, StoreError, TransitionError,
};
use crate::ports::{Clock, JobQueue, JobStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Stale running jobs put back on the queue.
    pub requeued: usize,

    /// Stale running jobs on their last attempt.
    pub timed_out: usize,

    /// Queued jobs without a queue entry, pushed again.
    pub repushed: usize,

    /// Queued jobs without a queue entry and without attempts left.
    pub exhausted: usize,
}

pub struct ReaperLoop {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    decider: Arc<dyn Decider>,
    clock: Arc<dyn Clock>,

    /// Slack on top of the attempt timeout before a running job counts as
    /// stale; also how long a queued job may sit without a queue entry.
    grace: Duration,
    interval: Duration,
}

impl ReaperLoop {
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queue,
            decider,
            clock,
            grace: Self::DEFAULT_GRACE,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn older_than(&self, since: chrono::DateTime<chrono::Utc>, limit: Duration) -> bool {
        self.clock
            .now()
            .signed_duration_since(since)
            .to_std()
            .is_ok_and(|elapsed| elapsed > limit)
    }

    fn is_stale(&self, record: &JobRecord) -> bool {
        let Some(started_at) = record.started_at else {
            return false;
        };
        // an attempt timeout too large to add to never goes stale
        record
            .policy
            .attempt_timeout
            .checked_add(self.grace)
            .is_some_and(|limit| self.older_than(started_at, limit))
    }

    /// One sweep over `running` records, then over `queued` ones.
    pub async fn run_once(&self) -> Result<ReapReport, BackendError> {
        let mut report = ReapReport::default();
        self.reap_running(&mut report).await?;
        self.recover_queued(&mut report).await?;
        Ok(report)
    }

    async fn reap_running(&self, report: &mut ReapReport) -> Result<(), BackendError> {
        for job_id in self.store.ids_with_status(JobStatus::Running).await? {
            let record = match self.store.get(job_id).await {
                Ok(record) => record,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            if record.status != JobStatus::Running || !self.is_stale(&record) {
                continue;
            }

            match self.reap(job_id, &record).await? {
                Some(JobStatus::Queued) => {
                    self.queue.requeue(job_id).await?;
                    report.requeued += 1;
                }
                Some(_) => report.timed_out += 1,
                None => {}
            }
        }
        Ok(())
    }

    /// Store IDs are read before queue IDs, so a job enqueued between the
    /// two reads is seen with its entry. A job popped in between may get a
    /// second entry; the worker drops it once the job has moved on.
    async fn recover_queued(&self, report: &mut ReapReport) -> Result<(), BackendError> {
        let queued = self.store.ids_with_status(JobStatus::Queued).await?;
        if queued.is_empty() {
            return Ok(());
        }
        let waiting: HashSet<JobId> = self.queue.entry_ids().await?.into_iter().collect();

        for job_id in queued.into_iter().filter(|id| !waiting.contains(id)) {
            let record = match self.store.get(job_id).await {
                Ok(record) => record,
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            if record.status != JobStatus::Queued || !self.older_than(record.updated_at, self.grace) {
                continue;
            }

            if record.policy.has_attempts_left(record.attempts) {
                self.queue.push(job_id).await?;
                tracing::warn!(%job_id, attempts = record.attempts, "re-pushed queued job missing from the queue");
                report.repushed += 1;
                continue;
            }

            let now = self.clock.now();
            match self
                .store
                .update(job_id, Box::new(move |r| r.mark_exhausted(now)))
                .await
            {
                Ok(_) => {
                    tracing::warn!(%job_id, attempts = record.attempts, "closed queued job with spent attempt budget");
                    report.exhausted += 1;
                }
                Err(StoreError::Transition(_) | StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Settle the stale attempt. `None` if the job moved on meanwhile.
    async fn reap(&self, job_id: JobId, seen: &JobRecord) -> Result<Option<JobStatus>, StoreError> {
        let attempt = seen.attempts;
        let started_at = seen.started_at;
        let limit = seen.policy.attempt_timeout;
        let decider = Arc::clone(&self.decider);
        let now = self.clock.now();

        let updated = self
            .store
            .update(
                job_id,
                Box::new(move |r| {
                    if r.started_at != started_at {
                        return Err(TransitionError {
                            from: r.status,
                            to: JobStatus::Queued,
                        });
                    }
                    let outcome = decider.decide(r, AttemptResult::TimedOut(limit));
                    r.settle_attempt(attempt, outcome, now)
                }),
            )
            .await;

        match updated {
            Ok(record) => {
                tracing::warn!(
                    %job_id,
                    attempt,
                    status = %record.status,
                    "reaped stale running job"
                );
                Ok(Some(record.status))
            }
            Err(StoreError::Transition(_) | StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report != ReapReport::default() => {
                            tracing::info!(
                                requeued = report.requeued,
                                timed_out = report.timed_out,
                                repushed = report.repushed,
                                exhausted = report.exhausted,
                                "reaper sweep"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "reaper sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("reaper loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{PoolConfig, WorkerDeps, WorkerPool};
    use crate::domain::{
        ChatMessage, ExecutorError, FailureKind, JobArgs, QueueError, RetryDecider, RetryPolicy,
    };
    use crate::impls::{InMemoryJobQueue, InMemoryJobStore};
    use crate::ports::{FixedClock, LoggingHooks, QueueEntry, TaskExecutor};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use ulid::Ulid;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryJobQueue>,
        clock: Arc<FixedClock>,
        reaper: ReaperLoop,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(InMemoryJobQueue::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let reaper = ReaperLoop::new(store.clone(), queue.clone(), Arc::new(RetryDecider), clock.clone())
            .with_grace(Duration::from_secs(10));
        Harness {
            store,
            queue,
            clock,
            reaper,
        }
    }

    async fn running_job(h: &Harness, max_attempts: u32) -> JobId {
        let now = h.clock.now();
        let record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobArgs::default(),
            RetryPolicy::new(max_attempts, Duration::from_secs(60)),
            now,
        );
        let id = h.store.create(record).await.unwrap();
        h.store
            .update(id, Box::new(move |r| r.start_attempt(now).map(|_| ())))
            .await
            .unwrap();
        id
    }

    async fn queued_job(h: &Harness, policy: RetryPolicy) -> JobId {
        let record = JobRecord::new(JobId::from_ulid(Ulid::new()), JobArgs::default(), policy, h.clock.now());
        h.store.create(record).await.unwrap()
    }

    #[tokio::test]
    async fn fresh_running_jobs_are_left_alone() {
        let h = harness();
        let id = running_job(&h, 3).await;
        h.clock.advance(chrono::Duration::seconds(65));

        assert_eq!(h.reaper.run_once().await.unwrap(), ReapReport::default());
        assert_eq!(h.store.get(id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn stale_job_with_attempts_left_is_requeued() {
        let h = harness();
        let id = running_job(&h, 3).await;
        h.clock.advance(chrono::Duration::seconds(71));

        let report = h.reaper.run_once().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(h.store.get(id).await.unwrap().status, JobStatus::Queued);
        assert_eq!(h.queue.pop(Duration::from_millis(10)).await.unwrap().unwrap().job_id, id);
    }

    #[tokio::test]
    async fn stale_job_on_last_attempt_times_out() {
        let h = harness();
        let id = running_job(&h, 1).await;
        h.clock.advance(chrono::Duration::seconds(71));

        let report = h.reaper.run_once().await.unwrap();
        assert_eq!(report.timed_out, 1);

        let record = h.store.get(id).await.unwrap();
        assert_eq!(record.status, JobStatus::TimedOut);
        assert_eq!(record.error.unwrap().kind, FailureKind::TimedOut);
        assert_eq!(h.queue.length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn huge_attempt_timeout_never_goes_stale() {
        let h = harness();
        let now = h.clock.now();
        let id = queued_job(&h, RetryPolicy::new(3, Duration::MAX)).await;
        h.store
            .update(id, Box::new(move |r| r.start_attempt(now).map(|_| ())))
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::days(365));

        assert_eq!(h.reaper.run_once().await.unwrap(), ReapReport::default());
        assert_eq!(h.store.get(id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn queued_job_missing_from_queue_is_pushed_again() {
        let h = harness();
        let id = queued_job(&h, RetryPolicy::default()).await;
        h.clock.advance(chrono::Duration::seconds(11));

        let report = h.reaper.run_once().await.unwrap();
        assert_eq!(report.repushed, 1);
        assert_eq!(h.queue.entry_ids().await.unwrap(), vec![id]);

        // the entry is live now, so the next sweep leaves it alone
        h.clock.advance(chrono::Duration::seconds(60));
        assert_eq!(h.reaper.run_once().await.unwrap(), ReapReport::default());
        assert_eq!(h.queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn queued_jobs_within_grace_or_with_an_entry_are_left_alone() {
        let h = harness();
        let fresh = queued_job(&h, RetryPolicy::default()).await;
        let waiting = queued_job(&h, RetryPolicy::default()).await;
        h.queue.push(waiting).await.unwrap();
        h.clock.advance(chrono::Duration::seconds(5));

        assert_eq!(h.reaper.run_once().await.unwrap(), ReapReport::default());

        h.clock.advance(chrono::Duration::seconds(60));
        let report = h.reaper.run_once().await.unwrap();
        assert_eq!(report.repushed, 1);
        let mut ids = h.queue.entry_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![fresh, waiting];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn queued_job_with_spent_budget_is_failed() {
        let h = harness();
        let now = h.clock.now();
        let id = queued_job(&h, RetryPolicy::new(1, Duration::from_secs(60))).await;
        h.store
            .update(
                id,
                Box::new(move |r| {
                    r.start_attempt(now)?;
                    r.requeue(now)
                }),
            )
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::seconds(11));

        let report = h.reaper.run_once().await.unwrap();
        assert_eq!(report.exhausted, 1);
        assert_eq!(report.repushed, 0);

        let record = h.store.get(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts, 1);
        assert_eq!(h.queue.length().await.unwrap(), 0);
    }

    /// In-memory queue whose first `requeue` fails.
    struct LosesFirstRequeue {
        inner: InMemoryJobQueue,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl JobQueue for LosesFirstRequeue {
        async fn push(&self, id: JobId) -> Result<(), QueueError> {
            self.inner.push(id).await
        }

        async fn pop(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
            self.inner.pop(timeout).await
        }

        async fn requeue(&self, id: JobId) -> Result<(), QueueError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(QueueError::Unavailable("connection reset".into()));
            }
            self.inner.requeue(id).await
        }

        async fn length(&self) -> Result<usize, QueueError> {
            self.inner.length().await
        }

        async fn entry_ids(&self) -> Result<Vec<JobId>, QueueError> {
            self.inner.entry_ids().await
        }

        async fn remove(&self, id: JobId) -> Result<usize, QueueError> {
            self.inner.remove(id).await
        }
    }

    /// Fails the first call retryably, then answers.
    struct FailsOnce(AtomicU32);

    #[async_trait]
    impl TaskExecutor for FailsOnce {
        async fn execute(&self, _args: &JobArgs) -> Result<String, ExecutorError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ExecutorError::retryable("flaky"))
            } else {
                Ok("recovered".into())
            }
        }
    }

    #[tokio::test]
    async fn retry_lost_by_the_queue_is_recovered() {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(LosesFirstRequeue {
            inner: InMemoryJobQueue::new(),
            failed_once: AtomicBool::new(false),
        });
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let deps = WorkerDeps {
            store: store.clone(),
            queue: queue.clone(),
            executor: Arc::new(FailsOnce(AtomicU32::new(0))),
            decider: Arc::new(RetryDecider),
            clock: clock.clone(),
        };
        let config = PoolConfig {
            concurrency: 1,
            pop_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
            shutdown_grace: Duration::from_secs(5),
        };
        let pool = WorkerPool::start(deps, config, Arc::new(LoggingHooks)).await;

        let record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobArgs::new(vec![ChatMessage::user("hello")]),
            RetryPolicy::new(3, Duration::from_secs(5)),
            clock.now(),
        );
        let id = store.create(record).await.unwrap();
        queue.push(id).await.unwrap();

        // first attempt fails and its requeue is lost
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let record = store.get(id).await.unwrap();
            if record.status == JobStatus::Queued && record.attempts == 1 {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "first attempt never settled: {record:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.length().await.unwrap(), 0);

        clock.advance(chrono::Duration::hours(1));
        let reaper = ReaperLoop::new(store.clone(), queue.clone(), Arc::new(RetryDecider), clock.clone());
        assert_eq!(reaper.run_once().await.unwrap().repushed, 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let record = store.get(id).await.unwrap();
            if record.is_terminal() {
                assert_eq!(record.status, JobStatus::Succeeded);
                assert_eq!(record.attempts, 2);
                break;
            }
            assert!(std::time::Instant::now() < deadline, "job never finished: {record:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await;
    }
}
