//! Provider-polling transcript fetcher.
//!
//! Pulls transcripts from external recording providers with an idempotent
//! short-circuit, explicit outcome classification, and a per-provider
//! exponential backoff schedule computed purely from the attempt number.

use crate::audit::AuditSink;
use crate::config::{FetcherSettings, RetryScheduleSettings};
use crate::queue::{
    enqueue_with_retry, EnqueueOptions, Job, JobQueue, ProcessCallJob, TranscriptFetchJob,
};
use crate::store::{Transcript, TranscriptStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Failure classes for a transcript fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Recording does not exist (404).
    NotFound,
    /// Recording exists but the transcript has not been produced yet.
    NotYetAvailable,
    /// Provider rate limited the request (429).
    RateLimited,
    /// Provider-side failure (5xx).
    Upstream,
    /// Network-level failure reaching the provider.
    Network,
    /// Anything else: malformed request, unknown provider, other 4xx.
    Invalid,
}

/// Error from fetching a transcript, with a retryability discriminant.
#[derive(Error, Debug)]
#[error("{kind:?}: {message}")]
pub struct TranscriptFetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl TranscriptFetchError {
    fn new(kind: FetchErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn not_yet_available(recording_id: &str) -> Self {
        Self::new(
            FetchErrorKind::NotYetAvailable,
            format!("transcript not yet produced for {}", recording_id),
            true,
        )
    }

    /// Classify an HTTP status from a recording provider.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            404 => Self::new(FetchErrorKind::NotFound, message, false),
            429 => Self::new(FetchErrorKind::RateLimited, message, true),
            s if s >= 500 => Self::new(FetchErrorKind::Upstream, message, true),
            _ => Self::new(FetchErrorKind::Invalid, message, false),
        }
    }
}

/// Error from a recording provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

/// A provider's view of a recording's transcript.
#[derive(Debug, Clone)]
pub struct RecordingTranscript {
    /// Present once the provider has produced the transcript.
    pub transcript: Option<String>,
}

/// Credentials handed to a recording provider call.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub api_secret: Option<String>,
}

/// External recording provider contract.
#[async_trait]
pub trait RecordingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_recording_transcript(
        &self,
        recording_id: &str,
        credentials: &ProviderCredentials,
    ) -> Result<RecordingTranscript, ProviderError>;
}

/// Per-provider retry schedule: exponential doubling from the provider's
/// initial delay, capped at a ceiling. A pure function of the attempt
/// number, so wall-clock drift never skews the schedule.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    pub max_delay: Duration,
}

impl RetrySchedule {
    pub fn from_settings(settings: &RetryScheduleSettings, max_delay: Duration) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_delay_seconds),
            max_attempts: settings.max_attempts,
            max_delay,
        }
    }

    /// Delay before the given attempt (1-based); `None` once the attempt
    /// budget is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let doublings = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_delay
            .saturating_mul(1u32.checked_shl(doublings).unwrap_or(u32::MAX));
        Some(delay.min(self.max_delay))
    }
}

/// Transcript fetcher over pluggable recording providers.
pub struct TranscriptFetcher {
    store: Arc<dyn TranscriptStore>,
    queue: Arc<dyn JobQueue>,
    audit: Arc<dyn AuditSink>,
    providers: HashMap<String, Arc<dyn RecordingProvider>>,
    credentials: HashMap<String, ProviderCredentials>,
    settings: FetcherSettings,
}

impl TranscriptFetcher {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditSink>,
        settings: FetcherSettings,
    ) -> Self {
        Self {
            store,
            queue,
            audit,
            providers: HashMap::new(),
            credentials: HashMap::new(),
            settings,
        }
    }

    /// Register a recording provider with its credentials.
    pub fn with_provider(
        mut self,
        provider: Arc<dyn RecordingProvider>,
        credentials: ProviderCredentials,
    ) -> Self {
        let name = provider.name().to_string();
        self.credentials.insert(name.clone(), credentials);
        self.providers.insert(name, provider);
        self
    }

    /// Retry schedule for a provider.
    pub fn schedule_for(&self, provider: &str) -> RetrySchedule {
        let settings = self
            .settings
            .providers
            .get(provider)
            .cloned()
            .unwrap_or_default();
        RetrySchedule::from_settings(
            &settings,
            Duration::from_secs(self.settings.max_delay_seconds),
        )
    }

    /// Fetch the transcript for a call and enqueue downstream processing.
    ///
    /// Idempotent: a call whose transcript is already stored just
    /// re-enqueues the processing job without refetching.
    #[instrument(skip(self), fields(call_id = %job.call_id, provider = %job.provider))]
    pub async fn fetch_transcript(
        &self,
        job: &TranscriptFetchJob,
    ) -> Result<(), TranscriptFetchError> {
        let existing = self
            .store
            .get_transcript(&job.call_id)
            .await
            .map_err(|e| TranscriptFetchError::new(FetchErrorKind::Upstream, e.to_string(), true))?;

        if existing.is_some() {
            info!("transcript already stored, re-enqueueing processing");
            self.enqueue_processing(job).await?;
            return Ok(());
        }

        let provider = self.providers.get(&job.provider).ok_or_else(|| {
            TranscriptFetchError::new(
                FetchErrorKind::Invalid,
                format!("unknown recording provider: {}", job.provider),
                false,
            )
        })?;
        let credentials = self
            .credentials
            .get(&job.provider)
            .cloned()
            .unwrap_or_default();

        let recording = provider
            .get_recording_transcript(&job.recording_id, &credentials)
            .await
            .map_err(|e| match e {
                ProviderError::Http { status, message } => {
                    TranscriptFetchError::from_status(status, message)
                }
                ProviderError::Network(message) => {
                    TranscriptFetchError::new(FetchErrorKind::Network, message, true)
                }
            })?;

        let text = match recording.transcript {
            Some(text) => text,
            None => {
                warn!("recording exists but transcript not yet produced");
                return Err(TranscriptFetchError::not_yet_available(&job.recording_id));
            }
        };

        self.store
            .store_transcript(Transcript {
                call_id: job.call_id.clone(),
                organization_id: job.organization_id.clone(),
                text,
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| TranscriptFetchError::new(FetchErrorKind::Upstream, e.to_string(), true))?;

        info!("transcript stored, enqueueing processing");
        self.enqueue_processing(job).await
    }

    async fn enqueue_processing(
        &self,
        job: &TranscriptFetchJob,
    ) -> Result<(), TranscriptFetchError> {
        let process = Job::ProcessCall(ProcessCallJob {
            call_id: job.call_id.clone(),
            organization_id: job.organization_id.clone(),
            account_id: job.account_id.clone(),
            has_transcript: true,
            user_id: None,
        });
        let options = EnqueueOptions {
            idempotent_job_id: Some(format!("process-{}", job.call_id)),
            ..Default::default()
        };

        enqueue_with_retry(
            self.queue.as_ref(),
            self.audit.as_ref(),
            process,
            options,
            3,
            Duration::from_millis(200),
        )
        .await
        .map_err(|e| TranscriptFetchError::new(FetchErrorKind::Upstream, e.to_string(), true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::queue::MemoryJobQueue;
    use crate::store::MemoryTranscriptStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubProvider {
        name: &'static str,
        calls: AtomicU32,
        outcome: fn() -> Result<RecordingTranscript, ProviderError>,
    }

    impl StubProvider {
        fn new(
            name: &'static str,
            outcome: fn() -> Result<RecordingTranscript, ProviderError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicU32::new(0),
                outcome,
            })
        }
    }

    #[async_trait]
    impl RecordingProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn get_recording_transcript(
            &self,
            _recording_id: &str,
            _credentials: &ProviderCredentials,
        ) -> Result<RecordingTranscript, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn fetch_job(provider: &str) -> TranscriptFetchJob {
        TranscriptFetchJob {
            call_id: "call_1".to_string(),
            organization_id: "org_1".to_string(),
            account_id: Some("acct_1".to_string()),
            recording_id: "rec_1".to_string(),
            provider: provider.to_string(),
            attempt: 1,
        }
    }

    fn fetcher_with(
        provider: Arc<StubProvider>,
        store: Arc<MemoryTranscriptStore>,
        queue: Arc<MemoryJobQueue>,
    ) -> TranscriptFetcher {
        TranscriptFetcher::new(
            store,
            queue,
            Arc::new(MemoryAuditSink::new()),
            FetcherSettings::default(),
        )
        .with_provider(provider, ProviderCredentials::default())
    }

    #[test]
    fn test_status_classification() {
        assert!(!TranscriptFetchError::from_status(404, "gone").retryable);
        assert_eq!(
            TranscriptFetchError::from_status(404, "gone").kind,
            FetchErrorKind::NotFound
        );
        assert!(TranscriptFetchError::from_status(429, "slow down").retryable);
        assert!(TranscriptFetchError::from_status(503, "maintenance").retryable);
        assert!(!TranscriptFetchError::from_status(422, "bad id").retryable);
    }

    #[test]
    fn test_schedule_lookup_falls_back_to_defaults() {
        let mut settings = FetcherSettings::default();
        settings.providers.insert(
            "zoom".to_string(),
            RetryScheduleSettings {
                initial_delay_seconds: 10,
                max_attempts: 8,
            },
        );
        let fetcher = TranscriptFetcher::new(
            Arc::new(MemoryTranscriptStore::new()),
            Arc::new(MemoryJobQueue::new()),
            Arc::new(MemoryAuditSink::new()),
            settings,
        );

        assert_eq!(fetcher.schedule_for("zoom").max_attempts, 8);
        assert_eq!(
            fetcher.schedule_for("zoom").initial_delay,
            Duration::from_secs(10)
        );
        assert_eq!(fetcher.schedule_for("gong").max_attempts, 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let schedule = RetrySchedule {
            initial_delay: Duration::from_secs(30),
            max_attempts: 6,
            max_delay: Duration::from_secs(300),
        };

        assert_eq!(schedule.delay_for_attempt(1), Some(Duration::from_secs(30)));
        assert_eq!(schedule.delay_for_attempt(2), Some(Duration::from_secs(60)));
        assert_eq!(schedule.delay_for_attempt(3), Some(Duration::from_secs(120)));
        assert_eq!(schedule.delay_for_attempt(4), Some(Duration::from_secs(240)));
        // Capped at the ceiling.
        assert_eq!(schedule.delay_for_attempt(5), Some(Duration::from_secs(300)));
        // Budget exhausted.
        assert_eq!(schedule.delay_for_attempt(7), None);
    }

    #[tokio::test]
    async fn test_existing_transcript_short_circuits() {
        let store = Arc::new(MemoryTranscriptStore::new());
        store
            .store_transcript(Transcript {
                call_id: "call_1".to_string(),
                organization_id: "org_1".to_string(),
                text: "already here".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let provider = StubProvider::new("zoom", || {
            panic!("provider must not be called for a stored transcript")
        });
        let queue = Arc::new(MemoryJobQueue::new());
        let fetcher = fetcher_with(provider.clone(), store, queue.clone());

        fetcher.fetch_transcript(&fetch_job("zoom")).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_success_stores_and_enqueues() {
        let provider = StubProvider::new("zoom", || {
            Ok(RecordingTranscript {
                transcript: Some("hello from the call".to_string()),
            })
        });
        let store = Arc::new(MemoryTranscriptStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let fetcher = fetcher_with(provider, store.clone(), queue.clone());

        fetcher.fetch_transcript(&fetch_job("zoom")).await.unwrap();

        let stored = store.get_transcript("call_1").await.unwrap().unwrap();
        assert_eq!(stored.text, "hello from the call");
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_processing_job_carries_account() {
        use crate::queue::JobConsumer;

        let provider = StubProvider::new("zoom", || {
            Ok(RecordingTranscript {
                transcript: Some("hello from the call".to_string()),
            })
        });
        let queue = Arc::new(MemoryJobQueue::new());
        let fetcher = fetcher_with(provider, Arc::new(MemoryTranscriptStore::new()), queue.clone());

        fetcher.fetch_transcript(&fetch_job("zoom")).await.unwrap();

        let delivered = queue.next_job().await.unwrap();
        match delivered.job {
            Job::ProcessCall(process) => {
                assert_eq!(process.account_id.as_deref(), Some("acct_1"));
                assert_eq!(process.organization_id, "org_1");
            }
            other => panic!("expected a processing job, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_yet_available_is_retryable() {
        let provider = StubProvider::new("zoom", || Ok(RecordingTranscript { transcript: None }));
        let fetcher = fetcher_with(
            provider,
            Arc::new(MemoryTranscriptStore::new()),
            Arc::new(MemoryJobQueue::new()),
        );

        let err = fetcher.fetch_transcript(&fetch_job("zoom")).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotYetAvailable);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_http_404_is_terminal() {
        let provider = StubProvider::new("zoom", || {
            Err(ProviderError::Http {
                status: 404,
                message: "no such recording".to_string(),
            })
        });
        let fetcher = fetcher_with(
            provider,
            Arc::new(MemoryTranscriptStore::new()),
            Arc::new(MemoryJobQueue::new()),
        );

        let err = fetcher.fetch_transcript(&fetch_job("zoom")).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_terminal() {
        let provider = StubProvider::new("zoom", || Ok(RecordingTranscript { transcript: None }));
        let fetcher = fetcher_with(
            provider,
            Arc::new(MemoryTranscriptStore::new()),
            Arc::new(MemoryJobQueue::new()),
        );

        let err = fetcher.fetch_transcript(&fetch_job("gong")).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Invalid);
        assert!(!err.retryable);
    }
}
