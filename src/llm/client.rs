//! Client for OpenAI-compatible chat completion endpoints.

use axum::http::header;
use reqwest::Client;
use std::time::Duration;

use super::types::{estimate_tokens, ChatCompletionRequest, Message, TokenUsage};
use crate::config::{ModelConfig, ServerConfig};

/// Errors from a single model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Failed to reach model endpoint: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),

    #[error("Model response contained no message content")]
    EmptyResponse,
}

/// Result of a completed model call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Model identifier the call was issued against
    pub model: String,
    pub usage: TokenUsage,
    /// False when `usage` was estimated locally
    pub usage_reported: bool,
}

/// Extract token usage from a provider response.
///
/// Returns (prompt_tokens, completion_tokens) if the usage object is present
/// and contains both fields. Returns None if usage is missing or incomplete.
fn extract_usage(response: &serde_json::Value) -> Option<(u32, u32)> {
    let usage = response.get("usage")?;
    let input = u32::try_from(usage.get("prompt_tokens")?.as_u64()?).ok()?;
    let output = u32::try_from(usage.get("completion_tokens")?.as_u64()?).ok()?;
    Some((input, output))
}

/// Extract the first choice's message content.
fn extract_content(response: &serde_json::Value) -> Option<&str> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ModelClient {
    http: Client,
}

impl ModelClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Build a client with the configured outbound timeouts.
    pub fn from_config(server: &ServerConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_secs))
            .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
            .build()?;
        Ok(Self::new(http))
    }

    /// Issue one chat completion against `model`.
    pub async fn complete(
        &self,
        model: &ModelConfig,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let request = ChatCompletionRequest {
            model: model.name.clone(),
            messages,
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        };

        let url = format!("{}/chat/completions", model.url.trim_end_matches('/'));

        let mut upstream = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request);

        if let Some(api_key) = &model.api_key {
            upstream = upstream.header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            );
        }

        tracing::debug!(model = %model.name, url = %url, "Calling model endpoint");

        let response = upstream.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let content = extract_content(&body)
            .ok_or(LlmError::EmptyResponse)?
            .to_string();

        let (usage, usage_reported) = match extract_usage(&body) {
            Some((input, output)) => (TokenUsage::new(input, output), true),
            None => {
                let input_text = system_prompt.unwrap_or_default().to_string() + prompt;
                (
                    TokenUsage::new(estimate_tokens(&input_text), estimate_tokens(&content)),
                    false,
                )
            }
        };

        tracing::debug!(
            model = %model.name,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            usage_reported,
            "Model call completed"
        );

        Ok(Completion {
            content,
            model: model.name.clone(),
            usage,
            usage_reported,
        })
    }
}
