//! Job record and its state transitions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TransitionError;
use super::ids::JobId;
use super::message::JobArgs;
use super::outcome::{JobFailure, JobOutcome};
use super::retry::RetryPolicy;
use super::state::JobStatus;

/// Single source of truth for one job.
///
/// Design:
/// - Queues hold `JobId` only; status, arguments and results live here.
/// - State changes go through methods so the state machine is enforced in
///   one place. A failed method leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub args: JobArgs,
    pub status: JobStatus,

    /// Attempts started so far (including the current one while Running).
    pub attempts: u32,

    pub policy: RetryPolicy,

    /// Set by the opt-in cancellation hook. A running job finishes its
    /// current attempt but is never requeued.
    #[serde(default)]
    pub cancel_requested: bool,

    /// Present only when `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Present only when `failed` or `timed_out`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Start of the current (or last) attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When a terminal state was reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(job_id: JobId, args: JobArgs, policy: RetryPolicy, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            args,
            status: JobStatus::Queued,
            attempts: 0,
            policy,
            cancel_requested: false,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Queued -> Running. Returns the attempt number (1-based).
    ///
    /// A job whose budget is already spent cannot start again.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<u32, TransitionError> {
        if !self.policy.has_attempts_left(self.attempts) {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::Running,
            });
        }
        self.transition(JobStatus::Running, now)?;
        self.attempts += 1;
        self.started_at = Some(now);
        Ok(self.attempts)
    }

    /// Running -> Succeeded.
    pub fn mark_succeeded(
        &mut self,
        result: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Succeeded, now)?;
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Running -> Queued, for another attempt.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Queued, now)
    }

    /// Running -> Failed / TimedOut, depending on the failure kind.
    pub fn mark_failed(
        &mut self,
        failure: JobFailure,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(failure.kind.terminal_status(), now)?;
        self.error = Some(failure);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Queued -> Failed through the cancellation hook.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::Queued {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.status = JobStatus::Failed;
        self.cancel_requested = true;
        self.error = Some(JobFailure::cancelled("cancelled before execution"));
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Queued -> Failed for a job whose attempt budget is already spent.
    pub fn mark_exhausted(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::Queued || self.policy.has_attempts_left(self.attempts) {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.status = JobStatus::Failed;
        self.error = Some(JobFailure::failed(format!(
            "attempt budget of {} already spent",
            self.policy.max_attempts
        )));
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Claim a queued job for a worker: start the next attempt, or fail the
    /// job if no attempts are left. Returns the new status.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<JobStatus, TransitionError> {
        if self.status == JobStatus::Queued && !self.policy.has_attempts_left(self.attempts) {
            self.mark_exhausted(now)?;
        } else {
            self.start_attempt(now)?;
        }
        Ok(self.status)
    }

    /// Flag the job for cancellation. No effect on terminal records.
    pub fn request_cancel(&mut self) {
        if !self.is_terminal() {
            self.cancel_requested = true;
        }
    }

    /// Apply a decided outcome to a Running record.
    pub fn settle(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> Result<(), TransitionError> {
        match outcome {
            JobOutcome::Success(result) => self.mark_succeeded(result, now),
            JobOutcome::Retryable(_) => self.requeue(now),
            JobOutcome::Terminal(failure) => self.mark_failed(failure, now),
        }
    }

    /// `settle`, restricted to the attempt the caller started. A record that
    /// has moved on (reaped and claimed again) is left alone.
    pub fn settle_attempt(
        &mut self,
        attempt: u32,
        outcome: JobOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != JobStatus::Running || self.attempts != attempt {
            return Err(TransitionError {
                from: self.status,
                to: outcome.target_status(),
            });
        }
        self.settle(outcome, now)
    }

    /// Terminal and older than the retention window.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        if !self.is_terminal() {
            return false;
        }
        self.finished_at
            .and_then(|finished| now.signed_duration_since(finished).to_std().ok())
            .is_some_and(|elapsed| elapsed >= retention)
    }
}
