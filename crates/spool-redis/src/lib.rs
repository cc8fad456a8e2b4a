//! spool-redis
//!
//! Durable `JobStore` and `JobQueue` on Redis, shared by API and worker
//! processes.

pub mod config;
pub mod keys;
pub mod queue;
pub mod store;

use std::sync::Arc;

use redis::aio::ConnectionManager;
use spool_core::domain::StoreError;
use spool_core::ports::Clock;

pub use config::RedisConfig;
pub use keys::KeySpace;
pub use queue::RedisJobQueue;
pub use store::RedisJobStore;

/// Store and queue sharing one connection manager.
pub struct RedisBackend {
    pub store: RedisJobStore,
    pub queue: RedisJobQueue,
}

impl RedisBackend {
    pub async fn connect(config: &RedisConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url()).map_err(store::unavailable)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(store::unavailable)?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            queue = %config.queue_name,
            "connected to redis"
        );

        let keys = KeySpace::new(config.queue_name.clone());
        Ok(Self {
            store: RedisJobStore::new(conn.clone(), keys.clone(), config.retention),
            queue: RedisJobQueue::new(conn, keys, clock, config.poll_interval),
        })
    }
}
