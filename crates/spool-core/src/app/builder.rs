//! AppBuilder: wires ports into a runnable `App`.
//!
//! `build()` fails fast when a required component is missing, so a
//! misconfigured process dies at start-up instead of on the first request.
//!
//! ```ignore
//! let app = AppBuilder::new()
//!     .store(store)
//!     .queue(queue)
//!     .executor(executor)
//!     .config(CoreConfig::from_env()?)
//!     .build()?;
//! let dispatcher = app.dispatcher();
//! let pool = app.start_workers().await?;
//! ```

use std::sync::Arc;

use crate::app::{
    Dispatcher, GcLoop, Monitor, ReaperLoop, WorkerDeps, WorkerPool,
};
use crate::config::CoreConfig;
use crate::domain::{Decider, RetryDecider};
use crate::ports::{
    Clock, IdGenerator, JobQueue, JobStore, LifecycleHooks, LoggingHooks, SystemClock,
    TaskExecutor, UlidGenerator,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing required component: {0}")]
    Missing(&'static str),
}

pub struct AppBuilder {
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn JobQueue>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    config: CoreConfig,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            queue: None,
            executor: None,
            clock: None,
            ids: None,
            decider: None,
            hooks: None,
            config: CoreConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Only needed by processes that run workers.
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Store and queue are required; everything else has a default.
    pub fn build(self) -> Result<App, BuildError> {
        let store = self.store.ok_or(BuildError::Missing("job store"))?;
        let queue = self.queue.ok_or(BuildError::Missing("job queue"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(App {
            store,
            queue,
            executor: self.executor,
            clock,
            ids,
            decider: self.decider.unwrap_or_else(|| Arc::new(RetryDecider)),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(LoggingHooks)),
            config: self.config,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wired application. Cheap handles to each component are built on demand.
pub struct App {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    executor: Option<Arc<dyn TaskExecutor>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    decider: Arc<dyn Decider>,
    hooks: Arc<dyn LifecycleHooks>,
    config: CoreConfig,
}

impl App {
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.ids),
            Arc::clone(&self.clock),
            self.config.dispatch_config(),
        )
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.clock),
        )
    }

    /// Start the worker pool. Requires an executor.
    pub async fn start_workers(&self) -> Result<WorkerPool, BuildError> {
        let executor = self
            .executor
            .clone()
            .ok_or(BuildError::Missing("task executor"))?;
        let deps = WorkerDeps {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            executor,
            decider: Arc::clone(&self.decider),
            clock: Arc::clone(&self.clock),
        };
        Ok(WorkerPool::start(deps, self.config.pool_config(), Arc::clone(&self.hooks)).await)
    }

    pub fn gc_loop(&self) -> GcLoop {
        GcLoop::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            GcLoop::DEFAULT_INTERVAL,
        )
    }

    pub fn reaper(&self) -> ReaperLoop {
        ReaperLoop::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.decider),
            Arc::clone(&self.clock),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, ExecutorError, JobArgs};
    use crate::impls::{InMemoryJobQueue, InMemoryJobStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct World;

    #[async_trait]
    impl TaskExecutor for World {
        async fn execute(&self, _args: &JobArgs) -> Result<String, ExecutorError> {
            Ok("world".into())
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl TaskExecutor for Slow {
        async fn execute(&self, _args: &JobArgs) -> Result<String, ExecutorError> {
            tokio::time::sleep(self.0).await;
            Ok("late".into())
        }
    }

    fn memory_builder() -> AppBuilder {
        AppBuilder::new()
            .store(Arc::new(InMemoryJobStore::default()))
            .queue(Arc::new(InMemoryJobQueue::new()))
    }

    #[test]
    fn build_requires_store_and_queue() {
        let err = AppBuilder::new()
            .queue(Arc::new(InMemoryJobQueue::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::Missing("job store")));

        let err = AppBuilder::new()
            .store(Arc::new(InMemoryJobStore::default()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::Missing("job queue")));
    }

    #[tokio::test]
    async fn workers_require_an_executor() {
        let app = memory_builder().build().unwrap();
        assert!(matches!(
            app.start_workers().await,
            Err(BuildError::Missing("task executor"))
        ));
    }

    #[tokio::test]
    async fn end_to_end_hello_world() {
        let app = memory_builder()
            .executor(Arc::new(World))
            .config(CoreConfig {
                concurrency: 2,
                ..CoreConfig::default()
            })
            .build()
            .unwrap();
        let pool = app.start_workers().await.unwrap();
        let monitor = app.monitor();
        let before = monitor.snapshot().await.unwrap();

        let handle = app
            .dispatcher()
            .enqueue(
                JobArgs::new(vec![ChatMessage::user("hello")]),
                Default::default(),
            )
            .await
            .unwrap();
        let result = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result, "world");

        let after = monitor.snapshot().await.unwrap();
        assert_eq!(after.completed, before.completed + 1);
        assert_eq!(after.enqueued + after.processing + after.failed, 0);

        let report = pool.shutdown().await;
        assert!(!report.forced);
    }

    #[tokio::test]
    async fn caller_timeout_leaves_job_running_to_completion() {
        let app = memory_builder()
            .executor(Arc::new(Slow(Duration::from_millis(500))))
            .build()
            .unwrap();
        let pool = app.start_workers().await.unwrap();

        let handle = app
            .dispatcher()
            .enqueue(JobArgs::new(vec![ChatMessage::user("hi")]), Default::default())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let err = handle.wait(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, crate::domain::WaitError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(400));

        assert_eq!(handle.wait(Duration::from_secs(5)).await.unwrap(), "late");
        pool.shutdown().await;
    }

    /// Outcome keyed on the message number: always retryable failure, fatal
    /// failure, or success.
    struct Mixed;

    #[async_trait]
    impl TaskExecutor for Mixed {
        async fn execute(&self, args: &JobArgs) -> Result<String, ExecutorError> {
            tokio::time::sleep(Duration::from_millis(15)).await;
            let n: u32 = args.messages[0].content.parse().unwrap_or(0);
            match n % 3 {
                0 => Err(ExecutorError::retryable("flaky")),
                1 => Err(ExecutorError::fatal("refused")),
                _ => Ok("ok".into()),
            }
        }
    }

    #[tokio::test]
    async fn monitor_never_counts_more_jobs_than_exist() {
        const JOBS: usize = 24;
        let app = memory_builder()
            .executor(Arc::new(Mixed))
            .config(CoreConfig {
                concurrency: 4,
                max_attempts: 2,
                ..CoreConfig::default()
            })
            .build()
            .unwrap();
        let dispatcher = app.dispatcher();
        let monitor = app.monitor();

        let mut handles = Vec::new();
        for n in 0..JOBS {
            let args = JobArgs::new(vec![ChatMessage::user(n.to_string())]);
            handles.push(dispatcher.enqueue(args, Default::default()).await.unwrap());
        }

        let pool = app.start_workers().await.unwrap();
        let sampler = tokio::spawn(async move {
            let mut samples = Vec::new();
            loop {
                let stats = monitor.snapshot().await.unwrap();
                samples.push(stats);
                if stats.completed + stats.failed == JOBS {
                    return samples;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        for handle in &handles {
            let _ = handle.wait(Duration::from_secs(10)).await;
        }
        let samples = tokio::time::timeout(Duration::from_secs(10), sampler)
            .await
            .unwrap()
            .unwrap();

        assert!(samples.len() > 1);
        for stats in &samples {
            let sum = stats.enqueued + stats.processing + stats.completed + stats.failed;
            assert!(sum <= JOBS, "over-counted: {stats:?}");
        }
        let last = samples.last().unwrap();
        assert_eq!(last.enqueued + last.processing, 0);
        assert_eq!(last.completed + last.failed, JOBS);
        assert_eq!(last.completed, 8);
        pool.shutdown().await;
    }
}
