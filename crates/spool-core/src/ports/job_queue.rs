//! JobQueue port.
//!
//! The queue carries job IDs only, in FIFO order. Job state lives in the
//! `JobStore`; an entry popped for a record that is no longer `queued` is
//! simply dropped by the worker.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{JobId, QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub enqueued_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append to the tail.
    async fn push(&self, id: JobId) -> Result<(), QueueError>;

    /// Take the head entry, waiting up to `timeout` for one to arrive.
    /// `Ok(None)` when the wait elapsed with the queue still empty.
    async fn pop(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError>;

    /// Put a job back for another attempt. Retries go to the tail.
    async fn requeue(&self, id: JobId) -> Result<(), QueueError> {
        self.push(id).await
    }

    async fn length(&self) -> Result<usize, QueueError>;

    /// IDs of every entry currently waiting, head first. May repeat an ID.
    async fn entry_ids(&self) -> Result<Vec<JobId>, QueueError>;

    /// Drop every waiting entry for `id`. Returns how many were removed.
    async fn remove(&self, id: JobId) -> Result<usize, QueueError>;

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
