//! Core configuration, read once at process start.
//!
//! Every config struct in the workspace follows the same shape:
//! `from_env()` for the process environment, `from_lookup()` for tests.
//! The helpers below are shared by the other crates.

use std::str::FromStr;
use std::time::Duration;

use crate::app::{DispatchConfig, PoolConfig};
use crate::domain::{ConfigError, RetryPolicy};

pub const MAX_CONCURRENCY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub concurrency: usize,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub retention: Duration,
    pub wait_timeout: Duration,
    pub wait_poll_interval: Duration,
    pub cancel_on_timeout: bool,
    pub shutdown_grace: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            attempt_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retention: Duration::from_secs(300),
            wait_timeout: Duration::from_secs(30),
            wait_poll_interval: Duration::from_millis(100),
            cancel_on_timeout: false,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let concurrency = parse_or(&lookup, "API_CONCURRENCY_LIMIT", defaults.concurrency)?;
        if !(1..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(ConfigError::Invalid {
                key: "API_CONCURRENCY_LIMIT",
                reason: format!("must be between 1 and {MAX_CONCURRENCY}, got {concurrency}"),
            });
        }

        let max_attempts = parse_or(&lookup, "MAX_TRIES", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_TRIES",
                reason: "must be at least 1".into(),
            });
        }

        let attempt_timeout = secs_or(&lookup, "JOB_TIMEOUT_SECS", defaults.attempt_timeout)?;
        if attempt_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "JOB_TIMEOUT_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let poll_ms = parse_or(
            &lookup,
            "WAIT_POLL_MS",
            defaults.wait_poll_interval.as_millis() as u64,
        )?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "WAIT_POLL_MS",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            concurrency,
            attempt_timeout,
            max_attempts,
            retention: secs_or(&lookup, "KEEP_RESULT_SECS", defaults.retention)?,
            wait_timeout: secs_or(&lookup, "WAIT_TIMEOUT_SECS", defaults.wait_timeout)?,
            wait_poll_interval: Duration::from_millis(poll_ms),
            cancel_on_timeout: bool_or(&lookup, "CANCEL_ON_TIMEOUT", defaults.cancel_on_timeout)?,
            shutdown_grace: secs_or(&lookup, "SHUTDOWN_GRACE_SECS", defaults.shutdown_grace)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.attempt_timeout)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency,
            shutdown_grace: self.shutdown_grace,
            ..PoolConfig::default()
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            wait_timeout: self.wait_timeout,
            poll_interval: self.wait_poll_interval,
            cancel_on_timeout: self.cancel_on_timeout,
            defaults: self.retry_policy(),
        }
    }
}

/// Parse `key` if set, else `default`. Empty values count as unset.
pub fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

/// Whole or fractional seconds.
pub fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_or(lookup, key, default.as_secs_f64())?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

pub fn bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("{raw:?} is not a boolean"),
        }),
    }
}

pub fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}
