use std::net::SocketAddr;

use spool_core::config::{parse_or, string_or};
use spool_core::domain::ConfigError;

/// HTTP listener settings.
///
/// | Env Var | Default   |
/// |---------|-----------|
/// | `HOST`  | `0.0.0.0` |
/// | `PORT`  | `8000`    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: string_or(&lookup, "HOST", &defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "HOST",
                reason: e.to_string(),
            })
    }
}
