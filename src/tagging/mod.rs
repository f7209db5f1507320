//! LLM-based call tagging.
//!
//! Derives topical tags and a funnel stage from redacted transcript text.
//! Results are cached by content hash so duplicate or re-ingested calls
//! never pay for a second completion.

pub mod cache;

pub use cache::{CacheStats, TagCache};

use crate::llm::{estimate_tokens, ChatClient, ChatMessage, ChatOptions};
use crate::rate_limit::RateLimiter;
use crate::{EkkoError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Funnel stages the tagger is allowed to assign. Anything else from the
/// model is discarded rather than stored.
const FUNNEL_STAGES: &[&str] = &["discovery", "evaluation", "negotiation", "closed"];

const MAX_TOPICS: usize = 8;

const TAGGING_SYSTEM_PROMPT: &str = "You are a sales call analyst. Given a call transcript, \
respond with a single JSON object of the form \
{\"topics\": [\"...\"], \"funnel_stage\": \"...\"}. \
Topics are short lowercase phrases naming what was discussed. \
funnel_stage is one of: discovery, evaluation, negotiation, closed. \
Respond with JSON only, no commentary.";

/// Tags derived from one call's transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallTags {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub funnel_stage: Option<String>,
}

/// Cache-first transcript tagger.
pub struct Tagger {
    cache: Arc<TagCache>,
    rate_limiter: Arc<RateLimiter>,
    model_options: ChatOptions,
}

impl Tagger {
    pub fn new(cache: Arc<TagCache>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            cache,
            rate_limiter,
            model_options: ChatOptions {
                temperature: 0.2,
                max_tokens: Some(256),
            },
        }
    }

    /// Tag a transcript, consulting the content-addressed cache first.
    #[instrument(skip(self, client, text), fields(provider = client.provider()))]
    pub async fn tag(&self, client: &dyn ChatClient, text: &str) -> Result<CallTags> {
        if let Some(tags) = self.cache.get(text) {
            debug!("tag cache hit");
            return Ok(tags);
        }

        let messages = [
            ChatMessage::system(TAGGING_SYSTEM_PROMPT),
            ChatMessage::user(text),
        ];
        let estimated = estimate_tokens(TAGGING_SYSTEM_PROMPT) + estimate_tokens(text);

        self.rate_limiter.acquire(estimated).await;
        let completion = client
            .chat_completion(&messages, &self.model_options)
            .await?;
        self.rate_limiter
            .report_usage(u64::from(completion.total_tokens), estimated);

        let tags = parse_tags(&completion.content)?;
        info!(topics = tags.topics.len(), funnel_stage = ?tags.funnel_stage, "tagged transcript");
        self.cache.set(text, tags.clone());
        Ok(tags)
    }
}

/// Parse the model's tag response, tolerating markdown fences and prose
/// around the JSON object.
fn parse_tags(response: &str) -> Result<CallTags> {
    let json_start = response.find('{');
    let json_end = response.rfind('}');

    let json_str = match (json_start, json_end) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    };

    let raw: CallTags = serde_json::from_str(json_str).map_err(|e| {
        // Truncate by chars, not bytes; model prose can be multibyte.
        let excerpt: String = response.chars().take(500).collect();
        EkkoError::Tagging(format!(
            "failed to parse tagging response: {}. Response was: {}",
            e, excerpt
        ))
    })?;

    Ok(normalize(raw))
}

fn normalize(raw: CallTags) -> CallTags {
    let mut topics: Vec<String> = Vec::new();
    for topic in raw.topics {
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() && !topics.contains(&topic) {
            topics.push(topic);
        }
        if topics.len() == MAX_TOPICS {
            break;
        }
    }

    let funnel_stage = raw.funnel_stage.and_then(|stage| {
        let stage = stage.trim().to_lowercase();
        if FUNNEL_STAGES.contains(&stage.as_str()) {
            Some(stage)
        } else {
            warn!(stage = %stage, "discarding unrecognized funnel stage");
            None
        }
    });

    CallTags {
        topics,
        funnel_stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitSettings, TagCacheSettings};
    use crate::llm::{ChatCompletion, LlmError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct StubClient {
        calls: AtomicU32,
        response: String,
    }

    impl StubClient {
        fn new(response: &str) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response: response.to_string(),
            }
        }
    }

    #[async_trait]
    impl ChatClient for StubClient {
        fn provider(&self) -> &str {
            "stub"
        }

        async fn chat_completion(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> std::result::Result<ChatCompletion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatCompletion {
                content: self.response.clone(),
                input_tokens: 100,
                output_tokens: 20,
                total_tokens: 120,
            })
        }
    }

    fn tagger() -> Tagger {
        let cache = Arc::new(TagCache::new(
            TagCacheSettings::default().max_entries,
            Duration::from_secs(3600),
        ));
        let limiter = Arc::new(RateLimiter::new(&RateLimitSettings::default()));
        Tagger::new(cache, limiter)
    }

    #[test]
    fn test_parse_plain_json() {
        let tags = parse_tags(
            r#"{"topics": ["pricing", "onboarding"], "funnel_stage": "negotiation"}"#,
        )
        .unwrap();
        assert_eq!(tags.topics, vec!["pricing", "onboarding"]);
        assert_eq!(tags.funnel_stage.as_deref(), Some("negotiation"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "Here are the tags:\n\n```json\n{\"topics\": [\"renewal\"], \"funnel_stage\": \"closed\"}\n```\n";
        let tags = parse_tags(response).unwrap();
        assert_eq!(tags.topics, vec!["renewal"]);
        assert_eq!(tags.funnel_stage.as_deref(), Some("closed"));
    }

    #[test]
    fn test_unknown_funnel_stage_discarded() {
        let tags =
            parse_tags(r#"{"topics": ["pricing"], "funnel_stage": "moonshot"}"#).unwrap();
        assert_eq!(tags.funnel_stage, None);
    }

    #[test]
    fn test_topics_normalized_and_deduped() {
        let tags = parse_tags(
            r#"{"topics": ["Pricing", " pricing ", "Support", ""], "funnel_stage": null}"#,
        )
        .unwrap();
        assert_eq!(tags.topics, vec!["pricing", "support"]);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_tags("I could not determine any tags.").is_err());
    }

    #[test]
    fn test_parse_long_multibyte_garbage_is_error() {
        // Longer than the error excerpt, entirely three-byte chars.
        let response = "あ".repeat(300);
        assert!(parse_tags(&response).is_err());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model() {
        let tagger = tagger();
        let client = StubClient::new(r#"{"topics": ["pricing"], "funnel_stage": "discovery"}"#);
        let text = "We discussed pricing tiers for the enterprise plan.";

        let first = tagger.tag(&client, text).await.unwrap();
        let second = tagger.tag(&client, text).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_text_misses_cache() {
        let tagger = tagger();
        let client = StubClient::new(r#"{"topics": ["pricing"], "funnel_stage": null}"#);

        tagger.tag(&client, "first call transcript").await.unwrap();
        tagger.tag(&client, "second call transcript").await.unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
