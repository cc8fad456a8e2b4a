use serde::{Deserialize, Serialize};

use crate::domain::JobStatus;

/// Per-status record counts, as reported by a `JobStore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Running => self.running,
            JobStatus::Succeeded => self.succeeded,
            JobStatus::Failed => self.failed,
            JobStatus::TimedOut => self.timed_out,
        }
    }

    pub fn set(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Queued => self.queued = count,
            JobStatus::Running => self.running = count,
            JobStatus::Succeeded => self.succeeded = count,
            JobStatus::Failed => self.failed = count,
            JobStatus::TimedOut => self.timed_out = count,
        }
    }

    pub fn increment(&mut self, status: JobStatus) {
        self.set(status, self.get(status) + 1);
    }

    /// Jobs that finished unsuccessfully, timeouts included.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.timed_out
    }
}
