//! Durable job queue contract and submission guard.
//!
//! The queue itself is an external collaborator with at-least-once
//! delivery and a dead-letter listing capability; this module defines the
//! narrow contract the pipeline consumes, the fixed job payloads, and a
//! bounded retry wrapper for the submission path. Submission failures are
//! a separate failure class from job-execution failures and carry their
//! own attempt budget.

mod memory;

pub use memory::MemoryJobQueue;

use crate::audit::{AuditEvent, AuditSink};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Job to process a stored transcript for a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCallJob {
    pub call_id: String,
    pub organization_id: String,
    pub account_id: Option<String>,
    pub has_transcript: bool,
    pub user_id: Option<String>,
}

/// Job to fetch a transcript from an external recording provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFetchJob {
    pub call_id: String,
    pub organization_id: String,
    /// CRM account the call belongs to; carried into the processing job so
    /// fetched transcripts get embedded and indexed.
    #[serde(default)]
    pub account_id: Option<String>,
    pub recording_id: String,
    /// Recording provider name (selects the retry schedule).
    pub provider: String,
    /// Fetch attempt number, starting at 1.
    pub attempt: u32,
}

/// The fixed set of pipeline job types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    ProcessCall(ProcessCallJob),
    FetchTranscript(TranscriptFetchJob),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessCall(_) => "process_call",
            Job::FetchTranscript(_) => "fetch_transcript",
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            Job::ProcessCall(j) => &j.call_id,
            Job::FetchTranscript(j) => &j.call_id,
        }
    }

    pub fn organization_id(&self) -> &str {
        match self {
            Job::ProcessCall(j) => &j.organization_id,
            Job::FetchTranscript(j) => &j.organization_id,
        }
    }
}

/// Backoff the queue should apply between job executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Fixed { delay_ms: u64 },
    Exponential { initial_ms: u64 },
}

/// Options for submitting a job.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Dedup key: the queue drops a submission whose id it has seen.
    pub idempotent_job_id: Option<String>,
    /// Executions the queue should attempt before dead-lettering.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            idempotent_job_id: None,
            max_attempts: 5,
            backoff: BackoffPolicy::Exponential { initial_ms: 1000 },
        }
    }
}

/// A job in the dead-letter set. The payload is kept as raw JSON: failed
/// jobs can carry malformed or truncated payloads, and the replay path
/// must be able to skip those rather than fail on them.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job_id: String,
    pub payload: serde_json::Value,
    pub failure_reason: String,
}

/// Error from queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Submission failed: {0}")]
    Submit(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Narrow contract of the external durable queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<(), QueueError>;

    /// Page through the dead-letter set.
    async fn list_failed_jobs(&self, offset: usize, limit: usize)
        -> Result<Vec<FailedJob>, QueueError>;

    /// The queue's native per-job retry: moves a failed job back to pending.
    async fn retry_job(&self, job_id: &str) -> Result<(), QueueError>;
}

/// A job delivered to a worker, with the handle needed to settle it.
#[derive(Debug, Clone)]
pub struct DeliveredJob {
    pub job_id: String,
    pub job: Job,
}

/// Consumer side of the queue, as seen by the worker pool.
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Next deliverable job, if any.
    async fn next_job(&self) -> Option<DeliveredJob>;

    /// Settle a job as completed.
    async fn ack(&self, job_id: &str);

    /// Settle a job as failed; the queue requeues or dead-letters it
    /// according to its attempt budget.
    async fn nack(&self, job_id: &str, reason: &str);
}

/// Submit a job with a bounded retry loop and jittered linear backoff.
///
/// This guards against transient failures in submitting to the broker
/// itself, so a hiccup at submission time does not silently drop work.
/// Exhausting the budget records an audit event and raises to the caller.
pub async fn enqueue_with_retry(
    queue: &dyn JobQueue,
    audit: &dyn AuditSink,
    job: Job,
    options: EnqueueOptions,
    max_attempts: u32,
    base_backoff: Duration,
) -> Result<(), QueueError> {
    let kind = job.kind();
    let mut last_error = None;

    for attempt in 1..=max_attempts.max(1) {
        match queue.enqueue(job.clone(), options.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(kind, attempt, error = %e, "enqueue attempt failed");
                last_error = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(jittered_linear(base_backoff, attempt)).await;
                }
            }
        }
    }

    let error = last_error.unwrap_or_else(|| QueueError::Submit("no attempts made".to_string()));
    audit.record(AuditEvent::EnqueueFailure {
        job_kind: kind.to_string(),
        error: error.to_string(),
    });
    Err(error)
}

/// Linear backoff with up to 50% random jitter.
fn jittered_linear(base: Duration, attempt: u32) -> Duration {
    let linear = base.saturating_mul(attempt);
    let jitter_cap = (linear.as_millis() as u64 / 2).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_cap);
    linear + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;

    fn process_job(call_id: &str) -> Job {
        Job::ProcessCall(ProcessCallJob {
            call_id: call_id.to_string(),
            organization_id: "org_1".to_string(),
            account_id: None,
            has_transcript: true,
            user_id: None,
        })
    }

    #[test]
    fn test_job_payload_round_trip() {
        let job = process_job("call_1");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "process_call");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.call_id(), "call_1");
    }

    #[test]
    fn test_jitter_stays_bounded() {
        for attempt in 1..=5 {
            let delay = jittered_linear(Duration::from_millis(100), attempt);
            let linear = 100 * attempt as u64;
            assert!(delay.as_millis() as u64 >= linear);
            assert!((delay.as_millis() as u64) < linear + linear / 2 + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_retry_recovers_from_transient_failure() {
        let queue = MemoryJobQueue::new();
        queue.fail_next_enqueues(2);
        let audit = MemoryAuditSink::new();

        enqueue_with_retry(
            &queue,
            &audit,
            process_job("call_1"),
            EnqueueOptions::default(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert_eq!(queue.pending_len(), 1);
        assert!(audit.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_exhaustion_raises_and_audits() {
        let queue = MemoryJobQueue::new();
        queue.fail_next_enqueues(10);
        let audit = MemoryAuditSink::new();

        let err = enqueue_with_retry(
            &queue,
            &audit,
            process_job("call_1"),
            EnqueueOptions::default(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, QueueError::Submit(_)));
        assert_eq!(audit.events().len(), 1);
        assert!(matches!(
            audit.events()[0],
            AuditEvent::EnqueueFailure { .. }
        ));
    }
}
