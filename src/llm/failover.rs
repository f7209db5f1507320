//! Circuit-breaker failover across a provider pairing.
//!
//! Composes a primary and an optional secondary chat client. Retryable
//! primary failures count against the breaker; at the failure threshold
//! the breaker opens and calls skip the primary until the cooldown elapses,
//! after which a single half-open trial tests recovery. Transient provider
//! outages are thereby isolated from user-visible failures without manual
//! intervention.

use super::{ChatClient, ChatCompletion, ChatMessage, ChatOptions, LlmError};
use crate::audit::{AuditEvent, AuditSink, BreakerState};
use crate::config::BreakerSettings;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Breaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Chat client wrapping one provider pairing behind a circuit breaker.
///
/// Breaker state is keyed per pairing by construction: one instance wraps
/// exactly one primary/secondary pair.
pub struct FailoverChatClient {
    primary: Arc<dyn ChatClient>,
    secondary: Option<Arc<dyn ChatClient>>,
    failure_threshold: u32,
    cooldown: Duration,
    max_attempts: u32,
    breaker: Mutex<Breaker>,
    audit: Arc<dyn AuditSink>,
    pairing: String,
}

impl FailoverChatClient {
    pub fn new(
        primary: Arc<dyn ChatClient>,
        secondary: Option<Arc<dyn ChatClient>>,
        settings: &BreakerSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let pairing = match &secondary {
            Some(s) => format!("{}->{}", primary.provider(), s.provider()),
            None => primary.provider().to_string(),
        };

        Self {
            primary,
            secondary,
            failure_threshold: settings.failure_threshold,
            cooldown: Duration::from_secs(settings.cooldown_seconds),
            max_attempts: settings.max_attempts.max(1),
            breaker: Mutex::new(Breaker {
                consecutive_failures: 0,
                opened_at: None,
            }),
            audit,
            pairing,
        }
    }

    /// Whether the primary may be attempted right now. Grants at most one
    /// trial per cooldown while open: the trial re-arms the cooldown so
    /// concurrent callers keep skipping the primary.
    fn primary_allowed(&self) -> bool {
        let mut breaker = self.breaker.lock().unwrap();
        match breaker.opened_at {
            None => true,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.cooldown {
                    breaker.opened_at = Some(Instant::now());
                    self.emit(BreakerState::Open, BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock().unwrap();
        if breaker.opened_at.take().is_some() {
            self.emit(BreakerState::HalfOpen, BreakerState::Closed);
        }
        breaker.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut breaker = self.breaker.lock().unwrap();
        breaker.consecutive_failures += 1;
        let was_open = breaker.opened_at.is_some();
        if was_open || breaker.consecutive_failures >= self.failure_threshold {
            breaker.opened_at = Some(Instant::now());
            let from = if was_open {
                BreakerState::HalfOpen
            } else {
                BreakerState::Closed
            };
            self.emit(from, BreakerState::Open);
        }
    }

    fn emit(&self, from: BreakerState, to: BreakerState) {
        warn!(pairing = %self.pairing, %from, %to, "circuit breaker transition");
        self.audit.record(AuditEvent::BreakerTransition {
            pairing: self.pairing.clone(),
            from,
            to,
        });
    }

    async fn call_secondary(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        match &self.secondary {
            Some(secondary) => {
                debug!(pairing = %self.pairing, "diverting call to secondary provider");
                secondary.chat_completion(messages, options).await
            }
            None => Err(LlmError::CircuitOpen(self.pairing.clone())),
        }
    }
}

#[async_trait]
impl ChatClient for FailoverChatClient {
    fn provider(&self) -> &str {
        &self.pairing
    }

    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        if !self.primary_allowed() {
            return self.call_secondary(messages, options).await;
        }

        if self.secondary.is_some() {
            // With a secondary, a single retryable primary failure diverts
            // the call rather than retrying the degraded provider.
            match self.primary.chat_completion(messages, options).await {
                Ok(result) => {
                    self.record_success();
                    Ok(result)
                }
                Err(e) if e.retryable() => {
                    warn!(pairing = %self.pairing, error = %e, "primary failed, failing over");
                    self.record_failure();
                    self.call_secondary(messages, options).await
                }
                Err(e) => Err(e),
            }
        } else {
            let mut last_error = None;
            for attempt in 1..=self.max_attempts {
                match self.primary.chat_completion(messages, options).await {
                    Ok(result) => {
                        self.record_success();
                        return Ok(result);
                    }
                    Err(e) if e.retryable() => {
                        warn!(
                            pairing = %self.pairing,
                            attempt,
                            error = %e,
                            "primary attempt failed"
                        );
                        self.record_failure();
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(last_error.unwrap_or_else(|| LlmError::Api("no attempts made".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubClient {
        name: &'static str,
        calls: AtomicU32,
        failures_before_success: u32,
        error: fn() -> LlmError,
    }

    impl StubClient {
        fn failing(name: &'static str, error: fn() -> LlmError) -> Self {
            Self {
                name,
                calls: AtomicU32::new(0),
                failures_before_success: u32::MAX,
                error,
            }
        }

        fn succeeding(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicU32::new(0),
                failures_before_success: 0,
                error: || LlmError::Api("unused".to_string()),
            }
        }

        fn flaky(name: &'static str, failures: u32) -> Self {
            Self {
                name,
                calls: AtomicU32::new(0),
                failures_before_success: failures,
                error: || LlmError::Timeout("deadline".to_string()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatClient for StubClient {
        fn provider(&self) -> &str {
            self.name
        }

        async fn chat_completion(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<ChatCompletion, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err((self.error)())
            } else {
                Ok(ChatCompletion {
                    content: format!("answer from {}", self.name),
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                })
            }
        }
    }

    fn settings(threshold: u32, cooldown_seconds: u64, max_attempts: u32) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: threshold,
            cooldown_seconds,
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_failover_to_secondary_primary_called_once() {
        let primary = Arc::new(StubClient::failing("openai", || {
            LlmError::Upstream("502".to_string())
        }));
        let secondary = Arc::new(StubClient::succeeding("anthropic"));
        let client = FailoverChatClient::new(
            primary.clone(),
            Some(secondary.clone()),
            &settings(5, 30, 3),
            Arc::new(MemoryAuditSink::new()),
        );

        let result = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(result.content, "answer from anthropic");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_without_failover() {
        let primary = Arc::new(StubClient::failing("openai", || {
            LlmError::InvalidRequest("bad field".to_string())
        }));
        let secondary = Arc::new(StubClient::succeeding("anthropic"));
        let client = FailoverChatClient::new(
            primary.clone(),
            Some(secondary.clone()),
            &settings(5, 30, 3),
            Arc::new(MemoryAuditSink::new()),
        );

        let err = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_skips_primary() {
        let primary = Arc::new(StubClient::failing("openai", || {
            LlmError::Timeout("deadline".to_string())
        }));
        let secondary = Arc::new(StubClient::succeeding("anthropic"));
        let audit = Arc::new(MemoryAuditSink::new());
        let client = FailoverChatClient::new(
            primary.clone(),
            Some(secondary.clone()),
            &settings(2, 30, 3),
            audit.clone(),
        );

        for _ in 0..4 {
            let _ = client
                .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
                .await;
        }

        // Two failures trip the breaker; later calls skip the primary.
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 4);
        assert!(audit.events().iter().any(|e| matches!(
            e,
            AuditEvent::BreakerTransition {
                to: BreakerState::Open,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_closes_on_success() {
        let primary = Arc::new(StubClient::flaky("openai", 2));
        let secondary = Arc::new(StubClient::succeeding("anthropic"));
        let client = FailoverChatClient::new(
            primary.clone(),
            Some(secondary.clone()),
            &settings(2, 30, 3),
            Arc::new(MemoryAuditSink::new()),
        );

        // Trip the breaker.
        for _ in 0..2 {
            let _ = client
                .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
                .await;
        }
        assert_eq!(primary.calls(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;

        // Half-open trial reaches the now-recovered primary and closes.
        let result = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, "answer from openai");
        assert_eq!(primary.calls(), 3);

        let result = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, "answer from openai");
    }

    #[tokio::test]
    async fn test_primary_only_retries_up_to_max_attempts() {
        let primary = Arc::new(StubClient::flaky("openai", 2));
        let client = FailoverChatClient::new(
            primary.clone(),
            None,
            &settings(10, 30, 3),
            Arc::new(MemoryAuditSink::new()),
        );

        let result = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(result.content, "answer from openai");
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test]
    async fn test_primary_only_exhaustion_returns_last_error() {
        let primary = Arc::new(StubClient::failing("openai", || {
            LlmError::Upstream("503".to_string())
        }));
        let client = FailoverChatClient::new(
            primary.clone(),
            None,
            &settings(10, 30, 2),
            Arc::new(MemoryAuditSink::new()),
        );

        let err = client
            .chat_completion(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Upstream(_)));
        assert_eq!(primary.calls(), 2);
    }
}
