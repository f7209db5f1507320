//! Relational-store seam for transcripts, chunks, and citation hydration.
//!
//! The store itself is an external collaborator; the pipeline consumes it
//! through this trait only. Chunk upserts are keyed by
//! `(transcript_id, chunk_index)` so re-processing a job is safe.

mod memory;

pub use memory::MemoryTranscriptStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored call transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: String,
    pub organization_id: String,
    /// Full transcript text as delivered by the recording provider.
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A stored transcript chunk. The text here is always post-redaction:
/// raw unredacted text must never reach a chunk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub id: Uuid,
    /// Call id doubles as the transcript id (one transcript per call).
    pub transcript_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub tags: Vec<String>,
    /// Vector-index reference once the chunk has been embedded.
    pub embedding_ref: Option<String>,
}

/// Call metadata used when hydrating citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMeta {
    pub call_id: String,
    pub title: String,
    pub occurred_at: DateTime<Utc>,
    pub speaker: String,
}

/// A hydrated citation: the chunk plus its call metadata.
#[derive(Debug, Clone)]
pub struct Citation {
    pub chunk: TranscriptChunk,
    pub call: CallMeta,
}

/// Trait for the relational store operations the pipeline needs.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Stored transcript for a call, if any.
    async fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>>;

    /// Store a transcript for a call.
    async fn store_transcript(&self, transcript: Transcript) -> Result<()>;

    /// Insert or replace a chunk by `(transcript_id, chunk_index)`,
    /// preserving the existing record id on replacement.
    async fn upsert_chunk(&self, chunk: TranscriptChunk) -> Result<Uuid>;

    /// All chunks for a transcript, ordered by index.
    async fn get_chunks(&self, transcript_id: &str) -> Result<Vec<TranscriptChunk>>;

    /// Record the embedding reference for a chunk.
    async fn set_embedding_ref(&self, chunk_id: Uuid, embedding_ref: &str) -> Result<()>;

    /// Store call metadata for citation hydration.
    async fn store_call_meta(&self, meta: CallMeta) -> Result<()>;

    /// Hydrate a citation (chunk text plus call title/date/speaker).
    async fn get_citation(&self, chunk_id: Uuid) -> Result<Option<Citation>>;
}
