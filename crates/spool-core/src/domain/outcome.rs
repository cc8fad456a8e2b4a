//! Attempt results and job outcomes.
//!
//! The worker never relies on error propagation to decide whether to retry.
//! Each executor invocation produces an `AttemptResult`; a `Decider` turns it
//! into a `JobOutcome`, and the outcome is applied to the record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ExecutorError;
use super::state::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executor reported an error.
    Failed,

    /// The attempt exceeded its timeout.
    TimedOut,

    /// The caller cancelled the job.
    Cancelled,
}

impl FailureKind {
    /// Status a job ends in when it fails this way.
    pub fn terminal_status(self) -> JobStatus {
        match self {
            FailureKind::TimedOut => JobStatus::TimedOut,
            FailureKind::Failed | FailureKind::Cancelled => JobStatus::Failed,
        }
    }
}

/// Error payload stored on a terminal `failed` / `timed_out` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Failed,
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TimedOut,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }
}

/// Raw result of one executor invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Completed(String),
    Errored(ExecutorError),
    TimedOut(Duration),
}

/// What happens to the job after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Store the result, transition to `succeeded`.
    Success(String),

    /// Transition back to `queued` and requeue at the tail.
    Retryable(JobFailure),

    /// Transition to `failed` or `timed_out` depending on the failure kind.
    Terminal(JobFailure),
}

impl JobOutcome {
    pub fn is_retry(&self) -> bool {
        matches!(self, JobOutcome::Retryable(_))
    }

    pub fn target_status(&self) -> JobStatus {
        match self {
            JobOutcome::Success(_) => JobStatus::Succeeded,
            JobOutcome::Retryable(_) => JobStatus::Queued,
            JobOutcome::Terminal(failure) => failure.kind.terminal_status(),
        }
    }
}
