//! Error types for Ekko.

use thiserror::Error;

/// Library-level error type for Ekko operations.
#[derive(Error, Debug)]
pub enum EkkoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Transcript fetch failed: {0}")]
    Fetch(#[from] crate::fetcher::TranscriptFetchError),

    #[error("LLM error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("Tagging failed: {0}")]
    Tagging(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Ekko operations.
pub type Result<T> = std::result::Result<T, EkkoError>;
