//! OpenAI chat-completion adapter.

use super::{ChatClient, ChatCompletion, ChatMessage, ChatOptions, ChatRole, LlmError};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Default timeout for OpenAI API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Create an OpenAI client with a request-level timeout.
///
/// Timeouts are classified as retryable, so a hung call degrades into a
/// failover instead of a stuck pipeline.
pub fn create_client(timeout: Duration) -> async_openai::Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client");

    async_openai::Client::with_config(OpenAIConfig::default()).with_http_client(http_client)
}

/// OpenAI-backed chat client. System instructions travel inline as a
/// system-role message, per the OpenAI message convention.
pub struct OpenAIChatClient {
    client: async_openai::Client<OpenAIConfig>,
    model: String,
}

impl OpenAIChatClient {
    pub fn new(model: &str) -> Self {
        Self::with_timeout(model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(model: &str, timeout: Duration) -> Self {
        Self {
            client: create_client(timeout),
            model: model.to_string(),
        }
    }

    fn map_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, LlmError> {
        let mapped = match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| LlmError::InvalidRequest(e.to_string()))?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| LlmError::InvalidRequest(e.to_string()))?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| LlmError::InvalidRequest(e.to_string()))?
                .into(),
        };
        Ok(mapped)
    }

    fn map_error(error: OpenAIError) -> LlmError {
        match error {
            OpenAIError::Reqwest(e) => {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Network(e.to_string())
                }
            }
            OpenAIError::ApiError(api) => {
                let kind = api.r#type.as_deref().unwrap_or("");
                if kind.contains("rate_limit") || api.message.contains("Rate limit") {
                    LlmError::RateLimited(api.message)
                } else if kind.contains("server_error") || kind.contains("overloaded") {
                    LlmError::Upstream(api.message)
                } else if kind.contains("invalid_request") {
                    LlmError::InvalidRequest(api.message)
                } else {
                    LlmError::Api(api.message)
                }
            }
            other => LlmError::Api(other.to_string()),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let mapped: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(Self::map_message)
            .collect::<Result<_, _>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(mapped)
            .temperature(options.temperature);
        if let Some(max_tokens) = options.max_tokens {
            builder.max_tokens(max_tokens);
        }
        let request = builder
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(Self::map_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| LlmError::Api("Empty response from model".to_string()))?
            .clone();

        let (input_tokens, output_tokens, total_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or((0, 0, 0));

        debug!(model = %self.model, total_tokens, "openai chat completion");

        Ok(ChatCompletion {
            content,
            input_tokens,
            output_tokens,
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn test_api_error_classification() {
        let rate_limited = OpenAIError::ApiError(ApiError {
            message: "Rate limit reached".to_string(),
            r#type: Some("rate_limit_exceeded".to_string()),
            param: None,
            code: None,
        });
        assert!(matches!(
            OpenAIChatClient::map_error(rate_limited),
            LlmError::RateLimited(_)
        ));

        let invalid = OpenAIError::ApiError(ApiError {
            message: "missing field".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: None,
        });
        assert!(matches!(
            OpenAIChatClient::map_error(invalid),
            LlmError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_message_mapping() {
        let msg = OpenAIChatClient::map_message(&ChatMessage::user("hi")).unwrap();
        assert!(matches!(msg, ChatCompletionRequestMessage::User(_)));
    }
}
