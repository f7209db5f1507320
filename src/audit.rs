//! Structured audit event emission.
//!
//! Dead-letter replays, circuit-breaker transitions, and enqueue failures
//! are recorded through a sink trait. Emission is fire-and-forget: a
//! failure to log must never fail the pipeline, so `record` is infallible.

use crate::deadletter::ReplaySummary;

/// Circuit-breaker state for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// An audit event emitted by the pipeline.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// A dead-letter replay run completed.
    DeadLetterReplay { summary: ReplaySummary },
    /// A circuit breaker changed state.
    BreakerTransition {
        pairing: String,
        from: BreakerState,
        to: BreakerState,
    },
    /// Submitting a job to the queue failed after exhausting retries.
    EnqueueFailure { job_kind: String, error: String },
}

/// Sink for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: emits structured tracing events.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::DeadLetterReplay { summary } => {
                tracing::info!(
                    scanned = summary.scanned,
                    replayed = summary.replayed,
                    "dead-letter replay completed"
                );
            }
            AuditEvent::BreakerTransition { pairing, from, to } => {
                tracing::warn!(%pairing, %from, %to, "circuit breaker transition");
            }
            AuditEvent::EnqueueFailure { job_kind, error } => {
                tracing::error!(%job_kind, %error, "enqueue failed after retries");
            }
        }
    }
}

/// Test sink that captures events in memory.
pub struct MemoryAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
