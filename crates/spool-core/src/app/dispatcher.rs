//! Dispatcher and JobHandle: the producer side of the queue.
//!
//! `enqueue` writes the record first and pushes the ID second, so a worker
//! can never pop an ID whose record does not exist yet.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    DispatchError, JobArgs, JobId, JobOptions, JobRecord, JobStatus, RetryPolicy, StoreError,
    WaitError,
};
use crate::ports::{Clock, IdGenerator, JobQueue, JobStore};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Caller-side wait bound. Independent of the per-attempt timeout.
    pub wait_timeout: Duration,

    /// How often a handle re-reads the record while waiting.
    pub poll_interval: Duration,

    /// Cancel the job when the caller gives up waiting.
    pub cancel_on_timeout: bool,

    /// Retry policy inherited by jobs that do not override it.
    pub defaults: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            cancel_on_timeout: false,
            defaults: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            queue,
            ids,
            clock,
            config,
        }
    }

    /// Create the record and push it onto the queue.
    ///
    /// If the push fails the record stays `queued` without a queue entry and
    /// the error is returned to the caller.
    pub async fn enqueue(
        &self,
        args: JobArgs,
        options: JobOptions,
    ) -> Result<JobHandle, DispatchError> {
        let job_id = self.ids.generate_job_id();
        let policy = options.resolve(self.config.defaults);
        let record = JobRecord::new(job_id, args, policy, self.clock.now());

        self.store.create(record).await?;
        self.queue.push(job_id).await?;

        tracing::debug!(
            %job_id,
            max_attempts = policy.max_attempts,
            attempt_timeout_ms = policy.attempt_timeout.as_millis() as u64,
            "job enqueued"
        );
        Ok(self.handle(job_id))
    }

    /// Handle for an existing job.
    pub fn handle(&self, job_id: JobId) -> JobHandle {
        JobHandle {
            job_id,
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            clock: Arc::clone(&self.clock),
            poll_interval: self.config.poll_interval,
        }
    }

    /// Enqueue and wait for the outcome, with the configured wait timeout.
    ///
    /// Never retries: a job that failed or timed out is reported as such.
    pub async fn dispatch(&self, args: JobArgs) -> Result<String, DispatchError> {
        let handle = self.enqueue(args, JobOptions::default()).await?;
        match handle.wait(self.config.wait_timeout).await {
            Ok(result) => Ok(result),
            Err(WaitError::Timeout(waited)) => {
                if self.config.cancel_on_timeout
                    && let Err(err) = handle.cancel().await
                {
                    tracing::warn!(job_id = %handle.job_id(), error = %err, "cancel after wait timeout failed");
                }
                Err(WaitError::Timeout(waited).into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Producer-side reference to one job.
#[derive(Clone)]
pub struct JobHandle {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub async fn status(&self) -> Result<JobStatus, StoreError> {
        Ok(self.store.get(self.job_id).await?.status)
    }

    /// Wait until the job is terminal or `timeout` elapses.
    ///
    /// Giving up does not touch the job; it keeps running to its own end.
    pub async fn wait(&self, timeout: Duration) -> Result<String, WaitError> {
        match tokio::time::timeout(timeout, self.poll_until_terminal()).await {
            Ok(result) => result,
            Err(_) => Err(WaitError::Timeout(timeout)),
        }
    }

    async fn poll_until_terminal(&self) -> Result<String, WaitError> {
        loop {
            let record = self.store.get(self.job_id).await?;
            let message = || record.error.as_ref().map(|e| e.message.clone()).unwrap_or_default();
            match record.status {
                JobStatus::Succeeded => return Ok(record.result.clone().unwrap_or_default()),
                JobStatus::Failed => return Err(WaitError::ExecutionFailed(message())),
                JobStatus::TimedOut => return Err(WaitError::JobTimedOut(message())),
                JobStatus::Queued | JobStatus::Running => {}
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Opt-in cancellation.
    ///
    /// A queued job is failed at once and its queue entry dropped. A running
    /// job finishes its current attempt and is not retried. Terminal jobs
    /// are left alone.
    pub async fn cancel(&self) -> Result<JobStatus, StoreError> {
        let now = self.clock.now();
        let before = self.store.get(self.job_id).await?.status;
        let record = self
            .store
            .update(
                self.job_id,
                Box::new(move |r| {
                    if r.status == JobStatus::Queued {
                        r.mark_cancelled(now)
                    } else {
                        r.request_cancel();
                        Ok(())
                    }
                }),
            )
            .await?;

        if before == JobStatus::Queued && record.is_terminal() {
            // a leftover entry is dropped by the worker that pops it
            if let Err(err) = self.queue.remove(self.job_id).await {
                tracing::warn!(job_id = %self.job_id, error = %err, "could not drop queue entry of cancelled job");
            }
        }
        tracing::info!(job_id = %self.job_id, status = %record.status, "job cancellation requested");
        Ok(record.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, FailureKind};
    use crate::impls::{InMemoryJobQueue, InMemoryJobStore};
    use crate::ports::{SystemClock, UlidGenerator};
    use std::time::Instant;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryJobQueue>,
        dispatcher: Dispatcher,
    }

    fn harness(config: DispatchConfig) -> Harness {
        let store = Arc::new(InMemoryJobStore::default());
        let queue = Arc::new(InMemoryJobQueue::new());
        let clock = Arc::new(SystemClock);
        let dispatcher = Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            config,
        );
        Harness {
            store,
            queue,
            dispatcher,
        }
    }

    fn fast() -> DispatchConfig {
        DispatchConfig {
            wait_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..DispatchConfig::default()
        }
    }

    fn hello() -> JobArgs {
        JobArgs::new(vec![ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn enqueue_creates_record_then_entry() {
        let h = harness(fast());
        let handle = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();

        let record = h.store.get(handle.job_id()).await.unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.policy, RetryPolicy::default());

        let entry = h.queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(entry.job_id, handle.job_id());
    }

    #[tokio::test]
    async fn options_override_pool_defaults() {
        let h = harness(fast());
        let options = JobOptions::default().with_max_attempts(7);
        let handle = h.dispatcher.enqueue(hello(), options).await.unwrap();

        assert_eq!(h.store.get(handle.job_id()).await.unwrap().policy.max_attempts, 7);
    }

    async fn finish(store: &InMemoryJobStore, id: JobId, outcome: crate::domain::JobOutcome) {
        store
            .update(
                id,
                Box::new(move |r| {
                    r.start_attempt(chrono::Utc::now())?;
                    r.settle(outcome.clone(), chrono::Utc::now())
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_returns_result_of_succeeded_job() {
        let h = harness(fast());
        let handle = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();
        finish(&h.store, handle.job_id(), crate::domain::JobOutcome::Success("world".into())).await;

        assert_eq!(handle.wait(Duration::from_secs(1)).await.unwrap(), "world");
    }

    #[tokio::test]
    async fn failed_and_timed_out_are_distinct() {
        use crate::domain::{JobFailure, JobOutcome};
        let h = harness(fast());

        let failed = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();
        finish(&h.store, failed.job_id(), JobOutcome::Terminal(JobFailure::failed("boom"))).await;
        assert!(matches!(
            failed.wait(Duration::from_secs(1)).await,
            Err(WaitError::ExecutionFailed(msg)) if msg == "boom"
        ));

        let slow = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();
        finish(&h.store, slow.job_id(), JobOutcome::Terminal(JobFailure::timed_out("slow"))).await;
        assert!(matches!(
            slow.wait(Duration::from_secs(1)).await,
            Err(WaitError::JobTimedOut(_))
        ));
    }

    #[tokio::test]
    async fn wait_times_out_without_touching_the_job() {
        let h = harness(fast());
        let handle = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();

        let started = Instant::now();
        let err = handle.wait(Duration::from_millis(100)).await.unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, WaitError::Timeout(_)));
        assert!(waited >= Duration::from_millis(90) && waited < Duration::from_secs(1));
        assert_eq!(handle.status().await.unwrap(), JobStatus::Queued);
    }

    #[tokio::test]
    async fn dispatch_timeout_is_fire_and_forget_by_default() {
        let h = harness(fast());
        let err = h.dispatcher.dispatch(hello()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Wait(WaitError::Timeout(_))));

        let entry = h.queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        let record = h.store.get(entry.job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert!(!record.cancel_requested);
    }

    #[tokio::test]
    async fn dispatch_timeout_cancels_when_enabled() {
        let h = harness(DispatchConfig {
            cancel_on_timeout: true,
            ..fast()
        });
        h.dispatcher.dispatch(hello()).await.unwrap_err();

        assert_eq!(h.queue.length().await.unwrap(), 0);
        let failed = h.store.ids_with_status(JobStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        let record = h.store.get(failed[0]).await.unwrap();
        assert_eq!(record.error.unwrap().kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn cancel_running_job_only_flags_it() {
        let h = harness(fast());
        let handle = h.dispatcher.enqueue(hello(), JobOptions::default()).await.unwrap();
        h.store
            .update(
                handle.job_id(),
                Box::new(|r| r.start_attempt(chrono::Utc::now()).map(|_| ())),
            )
            .await
            .unwrap();

        assert_eq!(handle.cancel().await.unwrap(), JobStatus::Running);
        assert!(h.store.get(handle.job_id()).await.unwrap().cancel_requested);
        assert_eq!(h.queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wait_on_purged_job_reports_store_error() {
        let h = harness(fast());
        let handle = h.dispatcher.handle(JobId::from_ulid(ulid::Ulid::new()));

        assert!(matches!(
            handle.wait(Duration::from_millis(100)).await,
            Err(WaitError::Store(StoreError::NotFound(_)))
        ));
    }
}
