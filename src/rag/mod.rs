//! Retrieval-augmented answering over processed call transcripts.
//!
//! Every retrieval is scoped to the caller's organization; the engine
//! refuses payloads that claim a different tenant before touching the
//! vector index.

pub mod context;
mod engine;

pub use context::ContextBuilder;
pub use engine::RagEngine;

use crate::llm::ChatMessage;

/// A single-question query against an account's calls.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    /// Account whose calls to search.
    pub account_id: String,
    /// Override for the configured context size.
    pub top_k: Option<usize>,
    /// Restrict retrieval to calls in these funnel stages.
    pub funnel_stages: Option<Vec<String>>,
    /// Organization id as echoed by the request payload. Compared against
    /// the caller context and rejected on mismatch; never used for scoping.
    pub organization_id: Option<String>,
}

/// A chat-mode request carrying prior conversation turns.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    /// Prior turns, oldest first. Bounded by configuration before use.
    pub history: Vec<ChatMessage>,
    /// Optional account scope; a chat without one searches the whole
    /// organization.
    pub account_id: Option<String>,
    pub funnel_stages: Option<Vec<String>>,
    /// Payload echo, validated the same way as [`QueryRequest`].
    pub organization_id: Option<String>,
}

/// A retrieved source chunk backing an answer.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub chunk_id: uuid::Uuid,
    pub call_id: String,
    pub call_title: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub speaker: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

/// An answer with its backing sources.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
    /// Total model tokens spent producing the answer. Zero when no model
    /// call was made.
    pub tokens_used: u64,
}
