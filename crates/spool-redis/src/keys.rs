//! Redis key layout.
//!
//! - `<q>`                 list of queue entries (RPUSH tail, LPOP head)
//! - `<q>:job:<id>`        job record as JSON
//! - `<q>:status:<status>` set of job IDs currently in that status

use spool_core::domain::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    queue: String,
}

impl KeySpace {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue: queue_name.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}:job:{}", self.queue, id.as_ulid())
    }

    pub fn status(&self, status: JobStatus) -> String {
        format!("{}:status:{}", self.queue, status.as_str())
    }
}
