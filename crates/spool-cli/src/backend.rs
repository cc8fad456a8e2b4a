//! Backend selection and the background loops that go with a worker.

use std::sync::Arc;

use clap::ValueEnum;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use spool_core::impls::{InMemoryJobQueue, InMemoryJobStore};
use spool_core::ports::{Clock, JobQueue, JobStore};
use spool_core::{App, CoreConfig};
use spool_redis::{RedisBackend, RedisConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Process-local store and queue; jobs die with the process
    Memory,
    /// Redis, shared between API and worker processes
    Redis,
}

pub struct Backend {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
}

pub async fn open(
    kind: BackendKind,
    core: &CoreConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Backend> {
    match kind {
        BackendKind::Memory => {
            tracing::warn!("using in-memory backend; jobs are lost on exit");
            Ok(Backend {
                store: Arc::new(InMemoryJobStore::new(core.retention)),
                queue: Arc::new(InMemoryJobQueue::new()),
            })
        }
        BackendKind::Redis => {
            let config = RedisConfig::from_env()?;
            let redis = RedisBackend::connect(&config, clock).await?;
            Ok(Backend {
                store: Arc::new(redis.store),
                queue: Arc::new(redis.queue),
            })
        }
    }
}

/// Retention GC and stale-job reaper, stopped together.
pub struct Maintenance {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Maintenance {
    pub fn start(app: &App) -> Self {
        let (stop, rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(app.gc_loop().run(rx.clone())),
            tokio::spawn(app.reaper().run(rx)),
        ];
        Self { stop, tasks }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "maintenance task ended abnormally");
            }
        }
    }
}
