use std::time::Duration;

use spool_core::config::{parse_or, secs_or, string_or};
use spool_core::domain::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,

    /// Queue list key; also the prefix of every other key.
    pub queue_name: String,

    /// TTL set on terminal records.
    pub retention: Duration,

    /// Interval between LPOP attempts while `pop` waits.
    pub poll_interval: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis".into(),
            port: 6379,
            queue_name: "spool:queue".into(),
            retention: Duration::from_secs(300),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: string_or(&lookup, "REDIS_HOST", &defaults.host),
            port: parse_or(&lookup, "REDIS_PORT", defaults.port)?,
            queue_name: string_or(&lookup, "QUEUE_NAME", &defaults.queue_name),
            retention: secs_or(&lookup, "KEEP_RESULT_SECS", defaults.retention)?,
            poll_interval: defaults.poll_interval,
        })
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}
