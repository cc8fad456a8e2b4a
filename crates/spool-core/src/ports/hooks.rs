//! Worker lifecycle hooks.

use async_trait::async_trait;

/// Called once by the worker pool around its lifetime.
///
/// `on_startup` runs before the first slot starts polling, `on_shutdown`
/// after every slot has stopped (or been aborted).
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn on_startup(&self, concurrency: usize);

    async fn on_shutdown(&self, forced: bool);
}

/// Default hooks: log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl LifecycleHooks for LoggingHooks {
    async fn on_startup(&self, concurrency: usize) {
        tracing::info!(concurrency, "worker pool starting");
    }

    async fn on_shutdown(&self, forced: bool) {
        if forced {
            tracing::warn!("worker pool stopped after forced drain");
        } else {
            tracing::info!("worker pool stopped");
        }
    }
}
