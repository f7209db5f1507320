//! Dead-letter classification and replay.
//!
//! Failed jobs carry a free-text failure reason. Classification maps that
//! text onto a small set of failure classes so the replayer only resubmits
//! work that could plausibly succeed on a second run. Replay is idempotent
//! across runs: resubmitted jobs leave the dead-letter set, so a second
//! sweep over the same backlog replays nothing.

use crate::audit::{AuditEvent, AuditSink};
use crate::queue::{Job, JobQueue, QueueError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Why a job died, as inferred from its failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Provider rate limiting (429s and friends).
    RateLimit,
    /// Provider-side server failure (5xx).
    UpstreamError,
    /// Network-level failure: timeouts, resets, DNS.
    Network,
    /// Anything unrecognized. Replaying these burns attempts on work that
    /// will fail the same way, so unknown reasons stay parked.
    NonRetryable,
}

impl FailureClass {
    pub fn retryable(&self) -> bool {
        !matches!(self, FailureClass::NonRetryable)
    }
}

/// Classify a failure reason. Pattern families are checked in order and
/// matching is case-insensitive; an empty or unrecognized reason is
/// non-retryable.
pub fn classify(reason: &str) -> FailureClass {
    let reason = reason.to_lowercase();

    const RATE_LIMIT: &[&str] = &["429", "rate limit", "too many requests", "quota"];
    const UPSTREAM: &[&str] = &[
        "500",
        "502",
        "503",
        "504",
        "internal server error",
        "bad gateway",
        "service unavailable",
        "gateway timeout",
        "upstream",
        "overloaded",
    ];
    const NETWORK: &[&str] = &[
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "connection closed",
        "network",
        "dns",
        "broken pipe",
    ];

    if RATE_LIMIT.iter().any(|p| reason.contains(p)) {
        FailureClass::RateLimit
    } else if UPSTREAM.iter().any(|p| reason.contains(p)) {
        FailureClass::UpstreamError
    } else if NETWORK.iter().any(|p| reason.contains(p)) {
        FailureClass::Network
    } else {
        FailureClass::NonRetryable
    }
}

/// Outcome of one replay sweep.
#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    /// Dead-letter jobs examined.
    pub scanned: usize,
    /// Jobs resubmitted to the queue.
    pub replayed: usize,
    /// Call ids of the replayed jobs.
    pub replayed_calls: Vec<String>,
    /// Payloads that did not deserialize to a known job.
    pub skipped_malformed: usize,
    /// Jobs outside the organization filter.
    pub skipped_filtered: usize,
    /// Jobs whose call id already got a replay this sweep.
    pub skipped_duplicate: usize,
    /// Jobs with a non-retryable failure class.
    pub skipped_non_retryable: usize,
}

/// Replay retryable dead-letter jobs, at most `limit` scanned per sweep.
///
/// Skips malformed payloads, jobs outside `organization_filter`, jobs whose
/// call id was already replayed this sweep, and non-retryable failures.
/// Emits one audit event summarizing the sweep.
#[instrument(skip(queue, audit))]
pub async fn replay_retryable_dead_letter_jobs(
    queue: &dyn JobQueue,
    audit: &dyn AuditSink,
    organization_filter: Option<&str>,
    limit: usize,
) -> Result<ReplaySummary, QueueError> {
    let failed = queue.list_failed_jobs(0, limit).await?;

    let mut summary = ReplaySummary::default();
    let mut replayed_call_ids: HashSet<String> = HashSet::new();

    for failed_job in failed {
        summary.scanned += 1;

        let job: Job = match serde_json::from_value(failed_job.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %failed_job.job_id, error = %e, "skipping malformed dead-letter payload");
                summary.skipped_malformed += 1;
                continue;
            }
        };

        if let Some(org) = organization_filter {
            if job.organization_id() != org {
                summary.skipped_filtered += 1;
                continue;
            }
        }

        if replayed_call_ids.contains(job.call_id()) {
            summary.skipped_duplicate += 1;
            continue;
        }

        let class = classify(&failed_job.failure_reason);
        if !class.retryable() {
            summary.skipped_non_retryable += 1;
            continue;
        }

        queue.retry_job(&failed_job.job_id).await?;
        replayed_call_ids.insert(job.call_id().to_string());
        summary.replayed += 1;
        summary.replayed_calls.push(job.call_id().to_string());
        info!(job_id = %failed_job.job_id, call_id = %job.call_id(), ?class, "replayed dead-letter job");
    }

    audit.record(AuditEvent::DeadLetterReplay {
        summary: summary.clone(),
    });
    Ok(summary)
}

/// Periodic dead-letter replayer.
pub struct ReplayScheduler {
    queue: Arc<dyn JobQueue>,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
    limit: usize,
}

impl ReplayScheduler {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditSink>,
        interval: Duration,
        limit: usize,
    ) -> Self {
        Self {
            queue,
            audit,
            interval,
            limit,
        }
    }

    /// Spawn the replay loop. A failing sweep is logged and retried on the
    /// next tick rather than stopping the scheduler.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match replay_retryable_dead_letter_jobs(
                    self.queue.as_ref(),
                    self.audit.as_ref(),
                    None,
                    self.limit,
                )
                .await
                {
                    Ok(summary) if summary.replayed > 0 => {
                        info!(replayed = summary.replayed, "scheduled replay resubmitted jobs");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "scheduled dead-letter replay failed"),
                }
            }
        })
    }
}
