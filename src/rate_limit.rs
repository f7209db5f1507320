//! Dual-dimension token-bucket rate limiting for expensive provider calls.
//!
//! Tracks both request count and token count against independent per-minute
//! ceilings. Callers that cannot be granted immediately wait in a FIFO
//! queue; a drain step re-evaluates the head of the queue on window reset
//! and on a short poll interval. Grants are strictly in arrival order: a
//! later caller is never permitted ahead of an earlier queued one, even if
//! its estimate is smaller.

use crate::config::RateLimitSettings;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Fixed rate-limit window.
const WINDOW: Duration = Duration::from_secs(60);

/// How often the background drain re-evaluates the queue.
const DRAIN_POLL: Duration = Duration::from_millis(250);

struct Waiter {
    estimated_tokens: u64,
    tx: oneshot::Sender<()>,
}

struct WindowState {
    window_start: Instant,
    requests: u32,
    tokens: u64,
    queue: VecDeque<Waiter>,
}

/// Token-bucket rate limiter over a fixed 60-second window.
///
/// All compound state (window counters plus wait queue) lives behind one
/// mutex; the drain path is the single writer that grants queued waiters.
pub struct RateLimiter {
    state: Mutex<WindowState>,
    requests_per_minute: u32,
    tokens_per_minute: u64,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                requests: 0,
                tokens: 0,
                queue: VecDeque::new(),
            }),
            requests_per_minute: settings.requests_per_minute,
            tokens_per_minute: settings.tokens_per_minute,
        }
    }

    /// Spawn the background drain loop. Must run for queued waiters to be
    /// granted; idempotent with respect to correctness if spawned more
    /// than once.
    pub fn start_drain(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DRAIN_POLL);
            loop {
                interval.tick().await;
                limiter.drain();
            }
        })
    }

    /// Wait until the window has headroom for a call of roughly
    /// `estimated_tokens`. Resolves immediately when both ceilings have
    /// headroom and no earlier caller is queued.
    pub async fn acquire(&self, estimated_tokens: u64) {
        let rx = {
            let mut state = self.state.lock().unwrap();
            self.reset_if_elapsed(&mut state);

            if state.queue.is_empty() && self.has_headroom(&state, estimated_tokens) {
                state.requests += 1;
                state.tokens += estimated_tokens;
                return;
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push_back(Waiter {
                estimated_tokens,
                tx,
            });
            debug!(queued = state.queue.len(), "rate limiter queueing caller");
            rx
        };

        // The sender lives in the queue until the drain grants it; a drop
        // without send only happens if the limiter itself is dropped.
        let _ = rx.await;
    }

    /// Reconcile the window's token counter with actual usage. Only ever
    /// adjusts upward, keeping the limiter conservative.
    pub fn report_usage(&self, actual_tokens: u64, estimated_tokens: u64) {
        if actual_tokens > estimated_tokens {
            let mut state = self.state.lock().unwrap();
            state.tokens += actual_tokens - estimated_tokens;
        }
    }

    /// Grant queued waiters, in arrival order, while headroom allows.
    /// Safe to call concurrently with new `acquire`s and idempotent when
    /// there is nothing to grant.
    pub fn drain(&self) {
        let mut state = self.state.lock().unwrap();
        self.reset_if_elapsed(&mut state);

        while let Some(head) = state.queue.front() {
            if !self.has_headroom(&state, head.estimated_tokens) {
                break;
            }
            let waiter = state.queue.pop_front().unwrap();
            state.requests += 1;
            state.tokens += waiter.estimated_tokens;
            let _ = waiter.tx.send(());
        }
    }

    fn reset_if_elapsed(&self, state: &mut WindowState) {
        if state.window_start.elapsed() >= WINDOW {
            state.window_start = Instant::now();
            state.requests = 0;
            state.tokens = 0;
        }
    }

    fn has_headroom(&self, state: &WindowState, estimated_tokens: u64) -> bool {
        if state.requests >= self.requests_per_minute {
            return false;
        }
        // An estimate larger than a whole window's budget is granted alone
        // at window start; it could otherwise never be granted.
        if estimated_tokens > self.tokens_per_minute {
            return state.requests == 0 && state.tokens == 0;
        }
        state.tokens + estimated_tokens <= self.tokens_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn limiter(rpm: u32, tpm: u64) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(&RateLimitSettings {
            requests_per_minute: rpm,
            tokens_per_minute: tpm,
        }))
    }

    #[tokio::test]
    async fn test_fast_path_grants_immediately() {
        let limiter = limiter(10, 1000);
        limiter.acquire(100).await;
        limiter.acquire(100).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_under_contention() {
        let limiter = limiter(1, 1_000_000);
        limiter.start_drain();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // First acquire consumes the window's single request slot.
        limiter.acquire(10).await;

        for id in 0..3u32 {
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            tokio::spawn(async move {
                limiter.acquire(10).await;
                let _ = tx.send(id);
            });
            // Let the task register its queue position before the next one.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(id) = rx.recv().await {
            order.push(id);
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_queue_jumping_on_smaller_estimate() {
        let limiter = limiter(100, 100);
        limiter.start_drain();
        let (tx, mut rx) = mpsc::unbounded_channel();

        limiter.acquire(80).await;

        // 50 does not fit the remaining 20; 10 would, but must not jump.
        for (id, estimate) in [(0u32, 50u64), (1, 10)] {
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            tokio::spawn(async move {
                limiter.acquire(estimate).await;
                let _ = tx.send(id);
            });
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(id) = rx.recv().await {
            order.push(id);
        }
        assert_eq!(order, vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset_restores_headroom() {
        let limiter = limiter(2, 1000);
        limiter.acquire(500).await;
        limiter.acquire(400).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        // Fresh window: the fast path applies again.
        limiter.acquire(999).await;
    }

    #[tokio::test]
    async fn test_report_usage_only_raises() {
        let limiter = limiter(10, 1000);
        limiter.acquire(100).await;

        // Actual below estimate must not lower the counter.
        limiter.report_usage(50, 100);
        {
            let state = limiter.state.lock().unwrap();
            assert_eq!(state.tokens, 100);
        }

        limiter.report_usage(300, 100);
        {
            let state = limiter.state.lock().unwrap();
            assert_eq!(state.tokens, 300);
        }
    }

    #[tokio::test]
    async fn test_oversized_estimate_granted_in_empty_window() {
        let limiter = limiter(10, 100);
        // Larger than the whole budget, but the window is empty.
        limiter.acquire(500).await;
    }
}
