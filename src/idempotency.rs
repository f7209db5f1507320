//! Webhook duplicate-delivery gate.
//!
//! Upstream webhook providers redeliver events; reprocessing a delivery
//! must not create duplicate calls or double-charge downstream LLM usage.
//! The gate records each delivery key with a TTL and admits a key only
//! when it is absent or its recorded expiry has passed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// TTL-bounded dedup ledger for webhook delivery keys.
///
/// In-memory, suitable for a single-instance deployment; a shared-store
/// implementation can replace this type without touching call sites.
pub struct IdempotencyGate {
    entries: Mutex<HashMap<String, Instant>>,
}

impl IdempotencyGate {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record `key` and return true iff it was absent or expired.
    ///
    /// Opportunistically prunes expired keys so the ledger stays bounded.
    pub fn mark_if_new(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        entries.retain(|_, expires_at| *expires_at > now);

        match entries.get(key) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                entries.insert(key.to_string(), now + ttl);
                true
            }
        }
    }

    /// Drop all expired keys.
    pub fn prune_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, expires_at| *expires_at > now);
    }

    /// Number of live keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdempotencyGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delivery_is_new() {
        let gate = IdempotencyGate::new();
        assert!(gate.mark_if_new("evt_1", Duration::from_secs(60)));
    }

    #[test]
    fn test_duplicate_within_ttl_is_suppressed() {
        let gate = IdempotencyGate::new();
        assert!(gate.mark_if_new("evt_1", Duration::from_secs(60)));
        assert!(!gate.mark_if_new("evt_1", Duration::from_secs(60)));
        assert!(!gate.mark_if_new("evt_1", Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_is_new_again_after_ttl() {
        let gate = IdempotencyGate::new();
        assert!(gate.mark_if_new("evt_1", Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(gate.mark_if_new("evt_1", Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pruning_bounds_memory() {
        let gate = IdempotencyGate::new();
        for i in 0..100 {
            gate.mark_if_new(&format!("evt_{}", i), Duration::from_secs(10));
        }
        assert_eq!(gate.len(), 100);

        tokio::time::advance(Duration::from_secs(11)).await;
        gate.prune_expired();
        assert!(gate.is_empty());
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let gate = IdempotencyGate::new();
        assert!(gate.mark_if_new("a", Duration::from_secs(60)));
        assert!(gate.mark_if_new("b", Duration::from_secs(60)));
        assert!(!gate.mark_if_new("a", Duration::from_secs(60)));
    }
}
