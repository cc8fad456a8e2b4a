//! Error types shared by the ports, the worker pool and the dispatcher.

use std::time::Duration;

use thiserror::Error;

use super::ids::JobId;
use super::state::JobStatus;

/// An illegal state-machine edge was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable. Surfaced immediately, never retried at this layer.
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("corrupt job record: {0}")]
    Corrupt(String),

    /// Optimistic update kept losing to concurrent writers.
    #[error("job {0} kept changing during update")]
    Conflict(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt queue entry: {0}")]
    Corrupt(String),
}

/// Error reported by a task executor for one attempt.
///
/// `retryable = false` short-circuits the retry budget (bad credentials,
/// malformed arguments, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
    pub retryable: bool,
}

impl ExecutorError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// What `JobHandle::wait` signals when no result is available.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The caller-side wait elapsed. The job itself is unaffected.
    #[error("no result after waiting {0:?}")]
    Timeout(Duration),

    /// The job reached `failed`.
    #[error("job failed: {0}")]
    ExecutionFailed(String),

    /// The job reached `timed_out` (per-attempt timeout, attempts exhausted).
    #[error("job timed out: {0}")]
    JobTimedOut(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the store or queue backends, for read paths that touch both.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Wait(#[from] WaitError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
