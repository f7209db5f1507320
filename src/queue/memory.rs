//! In-memory job queue implementation.
//!
//! Backs tests and single-process deployments. Mirrors the durable
//! queue's semantics: at-least-once delivery, idempotent-id dedup, a
//! per-job attempt budget, and a dead-letter set with native retry.

use super::{
    DeliveredJob, EnqueueOptions, FailedJob, Job, JobConsumer, JobQueue, QueueError,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

struct PendingJob {
    job_id: String,
    job: Job,
    attempts: u32,
    max_attempts: u32,
}

struct DeadJob {
    job_id: String,
    payload: serde_json::Value,
    max_attempts: u32,
    failure_reason: String,
}

struct QueueState {
    pending: VecDeque<PendingJob>,
    in_flight: Vec<PendingJob>,
    failed: Vec<DeadJob>,
    seen_ids: HashSet<String>,
}

/// In-memory queue used by tests and the worker pool.
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    fail_enqueues: AtomicU32,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: Vec::new(),
                failed: Vec::new(),
                seen_ids: HashSet::new(),
            }),
            next_id: AtomicU64::new(1),
            fail_enqueues: AtomicU32::new(0),
        }
    }

    /// Make the next `n` enqueue calls fail, simulating a broker hiccup.
    pub fn fail_next_enqueues(&self, n: u32) {
        self.fail_enqueues.store(n, Ordering::SeqCst);
    }

    /// Park a job directly in the dead-letter set (test setup helper).
    pub fn inject_failed(&self, job_id: &str, job: Job, failure_reason: &str) {
        let payload = serde_json::to_value(&job).unwrap_or(serde_json::Value::Null);
        self.inject_failed_raw(job_id, payload, failure_reason);
    }

    /// Park a raw payload in the dead-letter set, bypassing the `Job`
    /// type (for malformed-payload scenarios the replay must tolerate).
    pub fn inject_failed_raw(&self, job_id: &str, payload: serde_json::Value, reason: &str) {
        let mut state = self.state.lock().unwrap();
        state.failed.push(DeadJob {
            job_id: job_id.to_string(),
            payload,
            max_attempts: 5,
            failure_reason: reason.to_string(),
        });
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn failed_len(&self) -> usize {
        self.state.lock().unwrap().failed.len()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<(), QueueError> {
        let remaining = self.fail_enqueues.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_enqueues.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::Submit("broker unavailable".to_string()));
        }

        let mut state = self.state.lock().unwrap();

        let job_id = match options.idempotent_job_id {
            Some(id) => {
                if state.seen_ids.contains(&id) {
                    // Duplicate submission: already accepted once.
                    return Ok(());
                }
                state.seen_ids.insert(id.clone());
                id
            }
            None => format!("job_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
        };

        state.pending.push_back(PendingJob {
            job_id,
            job,
            attempts: 0,
            max_attempts: options.max_attempts.max(1),
        });
        Ok(())
    }

    async fn list_failed_jobs(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FailedJob>, QueueError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .failed
            .iter()
            .skip(offset)
            .take(limit)
            .map(|d| FailedJob {
                job_id: d.job_id.clone(),
                payload: d.payload.clone(),
                failure_reason: d.failure_reason.clone(),
            })
            .collect())
    }

    async fn retry_job(&self, job_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .failed
            .iter()
            .position(|d| d.job_id == job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;

        let dead = state.failed.remove(position);
        let job: Job = serde_json::from_value(dead.payload)?;
        state.pending.push_back(PendingJob {
            job_id: dead.job_id,
            job,
            attempts: 0,
            max_attempts: dead.max_attempts,
        });
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for MemoryJobQueue {
    async fn next_job(&self) -> Option<DeliveredJob> {
        let mut state = self.state.lock().unwrap();
        let mut pending = state.pending.pop_front()?;
        pending.attempts += 1;
        let delivered = DeliveredJob {
            job_id: pending.job_id.clone(),
            job: pending.job.clone(),
        };
        state.in_flight.push(pending);
        Some(delivered)
    }

    async fn ack(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.in_flight.retain(|p| p.job_id != job_id);
    }

    async fn nack(&self, job_id: &str, reason: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(position) = state.in_flight.iter().position(|p| p.job_id == job_id) else {
            return;
        };
        let pending = state.in_flight.remove(position);

        if pending.attempts >= pending.max_attempts {
            let payload =
                serde_json::to_value(&pending.job).unwrap_or(serde_json::Value::Null);
            state.failed.push(DeadJob {
                job_id: pending.job_id,
                payload,
                max_attempts: pending.max_attempts,
                failure_reason: reason.to_string(),
            });
        } else {
            state.pending.push_back(pending);
        }
    }
}
