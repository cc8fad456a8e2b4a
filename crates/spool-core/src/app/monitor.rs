//! Monitor: read-only view of queue depth and job counts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::BackendError;
use crate::ports::{Clock, JobQueue, JobStore};

/// One monitor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub timestamp: DateTime<Utc>,

    /// Entries waiting in the queue, capped at the number of `queued`
    /// records so an entry left behind by a job that already moved on is
    /// not counted twice.
    pub enqueued: usize,

    /// Jobs in `running`.
    pub processing: usize,

    /// Jobs in `succeeded`.
    pub completed: usize,

    /// Jobs in `failed` or `timed_out`.
    pub failed: usize,
}

impl QueueStats {
    pub const COLUMN_WIDTH: usize = 10;
    pub const RULE_WIDTH: usize = 60;

    pub fn header() -> String {
        format!(
            "{:^w$} | {:^w$} | {:^w$} | {:^w$} | {:^w$}",
            "Time",
            "Enqueued",
            "Processing",
            "Completed",
            "Failed",
            w = Self::COLUMN_WIDTH
        )
    }

    pub fn rule() -> String {
        "-".repeat(Self::RULE_WIDTH)
    }

    pub fn row(&self) -> String {
        format!(
            "{:^w$} | {:^w$} | {:^w$} | {:^w$} | {:^w$}",
            self.timestamp.format("%H:%M:%S").to_string(),
            self.enqueued,
            self.processing,
            self.completed,
            self.failed,
            w = Self::COLUMN_WIDTH
        )
    }
}

#[derive(Clone)]
pub struct Monitor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            queue,
            clock,
        }
    }

    /// Queue length is read before the counts: a job that leaves the queue
    /// in between is then missing from the length, never counted twice.
    pub async fn snapshot(&self) -> Result<QueueStats, BackendError> {
        let length = self.queue.length().await?;
        let counts = self.store.counts().await?;
        Ok(QueueStats {
            timestamp: self.clock.now(),
            enqueued: length.min(counts.queued),
            processing: counts.running,
            completed: counts.succeeded,
            failed: counts.unsuccessful(),
        })
    }
}
