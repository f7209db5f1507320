//! Content-addressed tag cache.
//!
//! Avoids repeat LLM tagging calls for duplicate or re-ingested chunk text.
//! This is purely a cost optimization: a miss is always safe to recompute.
//!
//! The key is a pure function of content with no tenant component, so
//! identical text across organizations shares a cache slot. Tags are
//! content-derived, not tenant-derived, which makes the sharing safe; the
//! key derivation is centralized in [`TagCache::key_for`] should that
//! policy ever change.

use super::CallTags;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    tags: CallTags,
    created_at: Instant,
}

struct CacheState {
    entries: HashMap<String, Entry>,
    /// LRU order: front is least recently used, back is most recent.
    order: Vec<String>,
    hits: u64,
    misses: u64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Bounded LRU cache of tag results keyed by content hash, with TTL.
pub struct TagCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: Duration,
}

impl TagCache {
    /// Create a cache holding at most `max_entries` entries, each valid
    /// for `ttl`.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: Vec::new(),
                hits: 0,
                misses: 0,
            }),
            max_entries,
            ttl,
        }
    }

    /// SHA-256 content hash used as the cache key.
    pub fn key_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up tags for `text`. An expired entry counts as a miss and is
    /// evicted; a live hit is promoted to most-recently-used.
    pub fn get(&self, text: &str) -> Option<CallTags> {
        let key = Self::key_for(text);
        let mut state = self.state.lock().unwrap();

        let expired = match state.entries.get(&key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.created_at.elapsed() > self.ttl,
        };

        if expired {
            state.entries.remove(&key);
            state.order.retain(|k| k != &key);
            state.misses += 1;
            return None;
        }

        state.order.retain(|k| k != &key);
        state.order.push(key.clone());
        state.hits += 1;
        state.entries.get(&key).map(|e| e.tags.clone())
    }

    /// Store tags for `text`, evicting the least-recently-used entry if
    /// the cache is full.
    pub fn set(&self, text: &str, tags: CallTags) {
        let key = Self::key_for(text);
        let mut state = self.state.lock().unwrap();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            if !state.order.is_empty() {
                let evicted = state.order.remove(0);
                state.entries.remove(&evicted);
            }
        }

        state.order.retain(|k| k != &key);
        state.order.push(key.clone());
        state.entries.insert(
            key,
            Entry {
                tags,
                created_at: Instant::now(),
            },
        );
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let total = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
        }
    }
}
