//! Retry policy: attempt budget and per-attempt timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy carried by every job record.
///
/// Pool-wide defaults are copied onto each job at enqueue time unless
/// `JobOptions` overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Always >= 1.
    pub max_attempts: u32,

    /// Upper bound on a single executor invocation.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
        }
    }

    /// Whether another attempt may start after `attempts` have been made.
    pub fn has_attempts_left(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_ATTEMPT_TIMEOUT)
    }
}

/// Per-job overrides applied on top of the pool defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub max_attempts: Option<u32>,
    pub attempt_timeout: Option<Duration>,
}

impl JobOptions {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn resolve(&self, defaults: RetryPolicy) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts.unwrap_or(defaults.max_attempts),
            self.attempt_timeout.unwrap_or(defaults.attempt_timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_worker_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[test]
    fn attempts_left() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert!(policy.has_attempts_left(0));
        assert!(policy.has_attempts_left(2));
        assert!(!policy.has_attempts_left(3));
    }

    #[test]
    fn options_override_only_what_they_set() {
        let defaults = RetryPolicy::new(3, Duration::from_secs(60));

        let resolved = JobOptions::default().with_max_attempts(5).resolve(defaults);
        assert_eq!(resolved.max_attempts, 5);
        assert_eq!(resolved.attempt_timeout, Duration::from_secs(60));

        assert_eq!(JobOptions::default().resolve(defaults), defaults);
    }
}
