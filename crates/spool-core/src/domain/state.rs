//! Job state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job status.
///
/// State transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> Queued (retry, loop until max_attempts)
/// - Queued -> Running -> Failed
/// - Queued -> Running -> TimedOut
///
/// Terminal states (Succeeded, Failed, TimedOut) are never left.
/// The explicit cancellation hook may also move a Queued job straight to
/// Failed; that edge is handled by `JobRecord::mark_cancelled` and is not
/// reported by `can_transition_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue (initially or after a retryable failure).
    Queued,

    /// Owned by a worker slot; an attempt is in progress.
    Running,

    /// Executor returned a result.
    Succeeded,

    /// Executor failed and no attempts remain (or the error was not retryable).
    Failed,

    /// The last attempt exceeded its timeout and no attempts remain.
    TimedOut,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::TimedOut,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }

    /// Regular edges of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Running, Succeeded) | (Running, Queued) | (Running, Failed)
                | (Running, TimedOut)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
