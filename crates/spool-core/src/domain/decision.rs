//! Decision model: what happens to a job after an attempt.
//!
//! Deciders are pure functions: given the record (after `start_attempt`)
//! and the attempt result, they return a `JobOutcome` without side effects.
//! Applying the outcome is the worker's job (`JobRecord::settle`).

use super::job::JobRecord;
use super::outcome::{AttemptResult, JobFailure, JobOutcome};

pub trait Decider: Send + Sync {
    fn decide(&self, record: &JobRecord, result: AttemptResult) -> JobOutcome;
}

/// Attempt-budget decider.
///
/// - success is always stored
/// - retry while `attempts < max_attempts` and the error is retryable
/// - otherwise terminal; a timeout stays a timeout so the job ends `timed_out`
/// - a cancelled job is never retried
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryDecider;

impl Decider for RetryDecider {
    fn decide(&self, record: &JobRecord, result: AttemptResult) -> JobOutcome {
        let (failure, retryable) = match result {
            AttemptResult::Completed(output) => return JobOutcome::Success(output),
            AttemptResult::Errored(err) => (JobFailure::failed(err.message), err.retryable),
            AttemptResult::TimedOut(limit) => (
                JobFailure::timed_out(format!(
                    "attempt {} exceeded timeout of {:?}",
                    record.attempts, limit
                )),
                true,
            ),
        };

        if record.cancel_requested {
            return JobOutcome::Terminal(JobFailure::cancelled(format!(
                "cancelled after attempt {}: {}",
                record.attempts, failure.message
            )));
        }

        if retryable && record.policy.has_attempts_left(record.attempts) {
            JobOutcome::Retryable(failure)
        } else {
            JobOutcome::Terminal(failure)
        }
    }
}
