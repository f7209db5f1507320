//! Context retrieval for answering.

use super::SourceChunk;
use crate::embedding::Embedder;
use crate::store::TranscriptStore;
use crate::vector_index::{VectorFilter, VectorIndex};
use crate::Result;
use std::sync::Arc;
use tracing::warn;

/// Retrieves and hydrates context chunks for a question.
pub struct ContextBuilder {
    vector_index: Arc<dyn VectorIndex>,
    store: Arc<dyn TranscriptStore>,
    embedder: Arc<dyn Embedder>,
    min_score: f32,
}

impl ContextBuilder {
    pub fn new(
        vector_index: Arc<dyn VectorIndex>,
        store: Arc<dyn TranscriptStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            vector_index,
            store,
            embedder,
            min_score: 0.3,
        }
    }

    /// Set the minimum similarity score threshold.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Retrieve up to `top_k` chunks matching `filter`, hydrated with
    /// their call metadata. A vector whose relational record has gone
    /// missing is skipped rather than failing the whole retrieval.
    pub async fn build(
        &self,
        query: &str,
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SourceChunk>> {
        let query_embedding = self.embedder.embed(query).await?;

        let matches = self
            .vector_index
            .query(&query_embedding, top_k, filter)
            .await?;

        let mut sources = Vec::with_capacity(matches.len());
        for m in matches {
            if m.score < self.min_score {
                continue;
            }
            match self.store.get_citation(m.metadata.chunk_id).await? {
                Some(citation) => sources.push(SourceChunk {
                    chunk_id: citation.chunk.id,
                    call_id: citation.call.call_id.clone(),
                    call_title: citation.call.title.clone(),
                    occurred_at: citation.call.occurred_at,
                    speaker: citation.call.speaker.clone(),
                    chunk_index: citation.chunk.chunk_index,
                    text: citation.chunk.text.clone(),
                    score: m.score,
                }),
                None => {
                    warn!(chunk_id = %m.metadata.chunk_id, "vector match has no stored chunk, skipping");
                }
            }
        }

        Ok(sources)
    }
}

/// Format sources as a numbered context block for the model prompt.
pub fn format_context_for_prompt(sources: &[SourceChunk]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            format!(
                "[Source {}] {} with {} on {} (chunk {})\n{}",
                i + 1,
                source.call_title,
                source.speaker,
                source.occurred_at.format("%Y-%m-%d"),
                source.chunk_index + 1,
                source.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
