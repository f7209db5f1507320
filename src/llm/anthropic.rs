//! Anthropic messages-API adapter.
//!
//! Anthropic takes system instructions in a top-level `system` field
//! rather than as an inline message; the adapter lifts system-role
//! messages out of the conversation at the wire boundary.

use super::{ChatClient, ChatCompletion, ChatMessage, ChatOptions, ChatRole, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

/// Anthropic-backed chat client.
pub struct AnthropicChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicChatClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_timeout(api_key, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_key: &str, model: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (used against stub servers in tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Lift system messages into the top-level field and map the rest.
    fn split_messages<'a>(messages: &'a [ChatMessage]) -> (Option<String>, Vec<WireMessage<'a>>) {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let wire = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| WireMessage {
                role: match m.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        let system = if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        };

        (system, wire)
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> LlmError {
        if status.as_u16() == 429 {
            LlmError::RateLimited(body)
        } else if status.is_server_error() {
            LlmError::Upstream(format!("{}: {}", status, body))
        } else {
            LlmError::InvalidRequest(format!("{}: {}", status, body))
        }
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let (system, wire) = Self::split_messages(messages);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            system,
            messages: wire,
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(format!("Malformed response: {}", e)))?;

        let content = parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| LlmError::Api("Empty response from model".to_string()))?;

        let total_tokens = parsed.usage.input_tokens + parsed.usage.output_tokens;
        debug!(model = %self.model, total_tokens, "anthropic chat completion");

        Ok(ChatCompletion {
            content,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            total_tokens,
        })
    }
}
