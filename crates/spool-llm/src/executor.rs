//! Gemini task executor.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use spool_core::domain::{ChatMessage, ExecutorError, JobArgs};
use spool_core::ports::TaskExecutor;

use crate::config::GeminiConfig;
use crate::types::{
    Content, ErrorEnvelope, GenerateRequest, GenerateResponse, GenerationConfig, Part,
};

pub struct GeminiExecutor {
    client: Client,
    config: GeminiConfig,
}

impl GeminiExecutor {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Map a chat role onto a Gemini content role. `None` for system messages.
fn gemini_role(role: &str) -> Result<Option<&'static str>, ExecutorError> {
    match role.to_ascii_lowercase().as_str() {
        "user" | "human" => Ok(Some("user")),
        "assistant" | "ai" | "model" => Ok(Some("model")),
        "system" => Ok(None),
        other => Err(ExecutorError::fatal(format!("unsupported message role {other:?}"))),
    }
}

pub fn build_request(
    messages: &[ChatMessage],
    config: &GeminiConfig,
) -> Result<GenerateRequest, ExecutorError> {
    if messages.is_empty() {
        return Err(ExecutorError::fatal("no messages to send"));
    }

    let mut contents = Vec::with_capacity(messages.len());
    let mut system = Vec::new();
    for message in messages {
        let part = Part {
            text: message.content.clone(),
        };
        match gemini_role(&message.role)? {
            Some(role) => contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![part],
            }),
            None => system.push(part),
        }
    }

    if contents.is_empty() {
        return Err(ExecutorError::fatal("only system messages were given"));
    }

    Ok(GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then_some(Content {
            role: None,
            parts: system,
        }),
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    })
}

/// Concatenated text of the first candidate.
pub fn extract_text(response: GenerateResponse) -> Result<String, ExecutorError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ExecutorError::retryable("model returned no candidates"));
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(ExecutorError::retryable(format!(
            "model returned an empty candidate (finish reason {reason})"
        )));
    }
    Ok(text)
}

/// Retry only what could succeed on a second try.
pub fn classify_status(status: StatusCode, body: &str) -> ExecutorError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| match e.error.status {
            Some(s) => format!("{s}: {}", e.error.message),
            None => e.error.message,
        })
        .unwrap_or_else(|_| body.chars().take(200).collect());
    let message = format!("gemini returned {status}: {detail}");

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ExecutorError::fatal(message)
        }
        StatusCode::TOO_MANY_REQUESTS => ExecutorError::retryable(message),
        s if s.is_server_error() => ExecutorError::retryable(message),
        _ => ExecutorError::fatal(message),
    }
}

#[async_trait]
impl TaskExecutor for GeminiExecutor {
    async fn execute(&self, args: &JobArgs) -> Result<String, ExecutorError> {
        let request = build_request(&args.messages, &self.config)?;
        tracing::debug!(
            model = %self.config.model,
            messages = args.len(),
            "calling gemini"
        );

        let response = self
            .client
            .post(self.config.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ExecutorError::retryable(format!("gemini request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            tracing::warn!(%status, retryable = err.retryable, "gemini call failed");
            return Err(err);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::retryable(format!("unreadable gemini response: {}", e.without_url())))?;
        extract_text(parsed)
    }
}
