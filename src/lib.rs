//! Ekko - Call Transcript Processing and RAG
//!
//! An asynchronous pipeline that turns long-form call-recording transcripts
//! into searchable, policy-safe knowledge, and a retrieval-augmented engine
//! that answers questions against that knowledge with cited evidence.
//!
//! # Overview
//!
//! Ekko allows you to:
//! - Ingest transcripts from external recording providers with idempotent,
//!   retry-safe job handling
//! - Redact PII before any text is stored or sent to a model
//! - Chunk, tag, embed, and index transcripts for semantic retrieval
//! - Ask questions and get grounded answers with `[Source N]` citations
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `redaction` - Local PII detection and redaction
//! - `chunking` - Sentence-aware transcript chunking
//! - `tagging` - LLM tagging with a content-addressed cache
//! - `rate_limit` - Dual-dimension token-bucket rate limiting
//! - `llm` - Language-model client abstraction with circuit-breaker failover
//! - `embedding` - Embedding generation
//! - `vector_index` - Vector similarity index abstraction
//! - `queue` - Durable job queue contract and enqueue guard
//! - `store` - Transcript and chunk persistence abstraction
//! - `idempotency` - Webhook duplicate-delivery gate
//! - `tenancy` - Caller context for tenant scoping
//! - `fetcher` - Provider-polling transcript fetcher
//! - `processor` - Pipeline orchestration
//! - `deadletter` - Dead-letter classification and replay
//! - `rag` - RAG engine for question answering
//! - `worker` - Fixed-size job worker pool
//!
//! # Example
//!
//! ```rust,no_run
//! use ekko::processor::TranscriptProcessor;
//! use ekko::queue::ProcessCallJob;
//!
//! # async fn run(processor: TranscriptProcessor) -> anyhow::Result<()> {
//! let job = ProcessCallJob {
//!     call_id: "call_123".to_string(),
//!     organization_id: "org_1".to_string(),
//!     account_id: Some("acct_9".to_string()),
//!     has_transcript: true,
//!     user_id: None,
//! };
//! processor.process_call(&job).await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod chunking;
pub mod config;
pub mod deadletter;
pub mod embedding;
pub mod error;
pub mod fetcher;
pub mod idempotency;
pub mod llm;
pub mod processor;
pub mod queue;
pub mod rag;
pub mod rate_limit;
pub mod redaction;
pub mod store;
pub mod tagging;
pub mod tenancy;
pub mod vector_index;
pub mod worker;

pub use error::{EkkoError, Result};
