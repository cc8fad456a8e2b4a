use std::time::Duration;

use spool_core::config::{parse_or, required, secs_or, string_or};
use spool_core::domain::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub base_url: String,

    /// HTTP client timeout. The worker's attempt timeout normally fires first.
    pub request_timeout: Duration,
}

// api_key stays out of logs
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_output_tokens: 8192,
            temperature: 0.0,
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::new(required(&lookup, "GOOGLE_API_KEY")?);

        let temperature = parse_or(&lookup, "TEMPERATURE", defaults.temperature)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                key: "TEMPERATURE",
                reason: format!("must be between 0.0 and 2.0, got {temperature}"),
            });
        }

        Ok(Self {
            model: string_or(&lookup, "MODEL_NAME", &defaults.model),
            max_output_tokens: parse_or(&lookup, "MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
            temperature,
            base_url: string_or(&lookup, "GEMINI_BASE_URL", &defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            request_timeout: secs_or(&lookup, "GEMINI_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            api_key: defaults.api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}
