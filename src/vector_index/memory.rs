//! In-memory vector index implementation.
//!
//! Useful for testing and single-instance deployments.

use super::{cosine_similarity, ChunkMetadata, VectorFilter, VectorIndex, VectorMatch};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct Record {
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

/// In-memory vector index.
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<Uuid, Record>>,
}

impl MemoryVectorIndex {
    /// Create a new in-memory vector index.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Total stored vectors.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.insert(id, Record { vector, metadata });
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>> {
        let records = self.records.read().unwrap();

        let mut matches: Vec<VectorMatch> = records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| VectorMatch {
                metadata: r.metadata.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_by_call(&self, call_id: &str) -> Result<usize> {
        let mut records = self.records.write().unwrap();
        let initial_len = records.len();
        records.retain(|_, r| r.metadata.call_id != call_id);
        Ok(initial_len - records.len())
    }
}
