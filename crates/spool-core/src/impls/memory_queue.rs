//! InMemoryJobQueue: FIFO of job IDs for single-process deployments and tests.
//!
//! - `VecDeque` behind a tokio `Mutex`
//! - `Notify` wakes poppers on push
//! - the lock is never held across an await on `Notify`

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{JobId, QueueError};
use crate::ports::{Clock, JobQueue, QueueEntry, SystemClock};

pub struct InMemoryJobQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            clock,
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, id: JobId) -> Result<(), QueueError> {
        let entry = QueueEntry {
            job_id: id,
            enqueued_at: self.clock.now(),
        };
        self.entries.lock().await.push_back(entry);
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueueEntry>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // register interest before checking, so a push in between is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.entries.lock().await.pop_front() {
                return Ok(Some(entry));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.entries.lock().await.pop_front());
            }
        }
    }

    async fn length(&self) -> Result<usize, QueueError> {
        Ok(self.entries.lock().await.len())
    }

    async fn entry_ids(&self) -> Result<Vec<JobId>, QueueError> {
        Ok(self.entries.lock().await.iter().map(|e| e.job_id).collect())
    }

    async fn remove(&self, id: JobId) -> Result<usize, QueueError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.job_id != id);
        Ok(before - entries.len())
    }
}
