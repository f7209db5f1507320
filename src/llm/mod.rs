//! Language-model client abstraction.
//!
//! A uniform chat-completion contract across pluggable providers. Each
//! provider adapts its own wire format behind [`ChatClient`]; provider
//! differences (e.g. Anthropic's top-level system field) are normalized at
//! the adapter boundary. [`failover::FailoverChatClient`] composes a
//! primary and an optional secondary adapter behind a circuit breaker.

pub mod anthropic;
pub mod failover;
pub mod openai;

pub use anthropic::AnthropicChatClient;
pub use failover::FailoverChatClient;
pub use openai::OpenAIChatClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Message role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Options for a chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Result of a chat-completion call, with token accounting.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Error from a language-model provider, carrying a retryability class.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Circuit open for {0}")]
    CircuitOpen(String),

    #[error("Provider API error: {0}")]
    Api(String),
}

impl LlmError {
    /// Whether the failure class is transient and safe to retry or divert
    /// to a secondary provider.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Upstream(_)
                | LlmError::Timeout(_)
                | LlmError::Network(_)
                | LlmError::CircuitOpen(_)
        )
    }
}

/// Uniform chat-completion contract across providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Provider name for logging and breaker pairing keys.
    fn provider(&self) -> &str;

    /// Run a chat completion.
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError>;
}

/// Resolves an organization's configured chat client.
///
/// Explicitly constructed and injected per process; workers receive a
/// handle rather than reading ambient state.
pub struct ClientRegistry {
    default_client: Arc<dyn ChatClient>,
    org_overrides: HashMap<String, Arc<dyn ChatClient>>,
}

impl ClientRegistry {
    pub fn new(default_client: Arc<dyn ChatClient>) -> Self {
        Self {
            default_client,
            org_overrides: HashMap::new(),
        }
    }

    /// Route an organization to a specific client.
    pub fn with_override(
        mut self,
        organization_id: impl Into<String>,
        client: Arc<dyn ChatClient>,
    ) -> Self {
        self.org_overrides.insert(organization_id.into(), client);
        self
    }

    /// Client for an organization, falling back to the default.
    pub fn resolve(&self, organization_id: &str) -> Arc<dyn ChatClient> {
        self.org_overrides
            .get(organization_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_client))
    }
}

/// Rough token estimate for rate limiting (4 chars per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryability() {
        assert!(LlmError::RateLimited("429".into()).retryable());
        assert!(LlmError::Upstream("502".into()).retryable());
        assert!(LlmError::Timeout("deadline".into()).retryable());
        assert!(!LlmError::InvalidRequest("bad field".into()).retryable());
        assert!(!LlmError::Api("parse".into()).retryable());
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
