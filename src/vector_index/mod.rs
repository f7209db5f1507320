//! Vector similarity index abstraction.
//!
//! Wraps an external similarity-search service behind a trait. Filters
//! support equality on organization and account ids and set membership on
//! funnel-stage metadata; the organization filter is mandatory, which is
//! what makes cross-tenant leakage structurally impossible at this layer.

mod memory;

pub use memory::MemoryVectorIndex;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filterable metadata stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunk record id in the relational store.
    pub chunk_id: Uuid,
    /// Call the chunk belongs to.
    pub call_id: String,
    /// Owning organization (tenant scope).
    pub organization_id: String,
    /// Owning account within the organization.
    pub account_id: String,
    /// Order of the chunk within the transcript.
    pub chunk_index: usize,
    /// Topic tags resolved during processing.
    pub topics: Vec<String>,
    /// Funnel stage resolved during processing.
    pub funnel_stage: Option<String>,
}

/// Retrieval filter. Organization scope is not optional.
#[derive(Debug, Clone)]
pub struct VectorFilter {
    pub organization_id: String,
    pub account_id: Option<String>,
    pub funnel_stages: Option<Vec<String>>,
}

impl VectorFilter {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            account_id: None,
            funnel_stages: None,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_funnel_stages(mut self, stages: Vec<String>) -> Self {
        self.funnel_stages = Some(stages);
        self
    }

    /// Whether metadata passes this filter.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if metadata.organization_id != self.organization_id {
            return false;
        }
        if let Some(account_id) = &self.account_id {
            if &metadata.account_id != account_id {
                return false;
            }
        }
        if let Some(stages) = &self.funnel_stages {
            match &metadata.funnel_stage {
                Some(stage) if stages.contains(stage) => {}
                _ => return false,
            }
        }
        true
    }
}

/// A search match with score.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub metadata: ChunkMetadata,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store or replace a vector with its metadata.
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: ChunkMetadata) -> Result<()>;

    /// Search for the nearest vectors passing `filter`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Remove all vectors for a call.
    async fn delete_by_call(&self, call_id: &str) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
