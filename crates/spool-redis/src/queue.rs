//! RedisJobQueue: a Redis list of JSON queue entries.
//!
//! `pop` polls LPOP instead of using BLPOP. The connection is a shared
//! multiplexed `ConnectionManager`, and a blocking command on it would
//! stall every other command behind it.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use spool_core::domain::{JobId, QueueError};
use spool_core::ports::{Clock, JobQueue, QueueEntry};

use crate::keys::KeySpace;

fn unavailable(err: redis::RedisError) -> QueueError {
    QueueError::Unavailable(err.to_string())
}

pub(crate) fn encode_entry(entry: &QueueEntry) -> Result<String, QueueError> {
    serde_json::to_string(entry).map_err(|e| QueueError::Corrupt(e.to_string()))
}

pub(crate) fn decode_entry(raw: &str) -> Result<QueueEntry, QueueError> {
    serde_json::from_str(raw).map_err(|e| QueueError::Corrupt(format!("{raw:?}: {e}")))
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    keys: KeySpace,
    clock: std::sync::Arc<dyn Clock>,
    poll_interval: Duration,
}

impl RedisJobQueue {
    pub fn new(
        conn: ConnectionManager,
        keys: KeySpace,
        clock: std::sync::Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            conn,
            keys,
            clock,
            poll_interval,
        }
    }

    async fn try_pop(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .lpop(self.keys.queue(), None)
            .await
            .map_err(unavailable)?;
        raw.as_deref().map(decode_entry).transpose()
    }

    async fn raw_entries(&self) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        conn.lrange(self.keys.queue(), 0, -1)
            .await
            .map_err(unavailable)
    }
}

/// Raw list items whose entry belongs to `id`. Items that do not decode are
/// skipped.
pub(crate) fn items_for(raw: &[String], id: JobId) -> Vec<&String> {
    raw.iter()
        .filter(|item| decode_entry(item).is_ok_and(|entry| entry.job_id == id))
        .collect()
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, id: JobId) -> Result<(), QueueError> {
        let entry = QueueEntry {
            job_id: id,
            enqueued_at: self.clock.now(),
        };
        let mut conn = self.conn.clone();
        let _: usize = conn
            .rpush(self.keys.queue(), encode_entry(&entry)?)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.try_pop().await? {
                return Ok(Some(entry));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn length(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        conn.llen(self.keys.queue()).await.map_err(unavailable)
    }

    async fn entry_ids(&self) -> Result<Vec<JobId>, QueueError> {
        let mut ids = Vec::new();
        for raw in self.raw_entries().await? {
            match decode_entry(&raw) {
                Ok(entry) => ids.push(entry.job_id),
                Err(err) => tracing::warn!(error = %err, "skipping malformed queue entry"),
            }
        }
        Ok(ids)
    }

    /// LREM on the exact item text, so an entry popped in the meantime is
    /// simply not found.
    async fn remove(&self, id: JobId) -> Result<usize, QueueError> {
        let raw = self.raw_entries().await?;
        let mut removed = 0;
        let mut conn = self.conn.clone();
        for item in items_for(&raw, id) {
            let n: usize = conn
                .lrem(self.keys.queue(), 1, item)
                .await
                .map_err(unavailable)?;
            removed += n;
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
