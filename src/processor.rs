//! Transcript processing pipeline.
//!
//! Turns a stored transcript into redacted, tagged, embedded chunks. Every
//! step is idempotent over the same input: chunk records are upserted by
//! position and vectors are replaced by chunk id, so a redelivered job
//! converges on the same state instead of duplicating it.

use crate::chunking;
use crate::llm::ClientRegistry;
use crate::queue::ProcessCallJob;
use crate::redaction::Redactor;
use crate::store::{TranscriptChunk, TranscriptStore};
use crate::tagging::Tagger;
use crate::vector_index::{ChunkMetadata, VectorIndex};
use crate::Result;
use crate::embedding::Embedder;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Orchestrates the per-call processing pipeline.
pub struct TranscriptProcessor {
    store: Arc<dyn TranscriptStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    tagger: Arc<Tagger>,
    redactor: Redactor,
    registry: Arc<ClientRegistry>,
}

impl TranscriptProcessor {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        tagger: Arc<Tagger>,
        registry: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            store,
            vector_index,
            embedder,
            tagger,
            redactor: Redactor::new(),
            registry,
        }
    }

    /// Process one call end to end.
    ///
    /// A call whose transcript has not arrived yet is not an error: the
    /// fetch path will enqueue a fresh processing job once it lands.
    #[instrument(skip(self, job), fields(call_id = %job.call_id, organization_id = %job.organization_id))]
    pub async fn process_call(&self, job: &ProcessCallJob) -> Result<()> {
        let transcript = match self.store.get_transcript(&job.call_id).await? {
            Some(t) => t,
            None => {
                warn!("no transcript stored for call, skipping");
                return Ok(());
            }
        };

        let raw_chunks = chunking::chunk(&transcript.text);
        if raw_chunks.is_empty() {
            info!("transcript produced no chunks, nothing to do");
            return Ok(());
        }
        debug!(chunks = raw_chunks.len(), "chunked transcript");

        let client = self.registry.resolve(&job.organization_id);

        // Tag against the masked full text so raw PII never reaches a model.
        let masked = self.redactor.mask_pii(&transcript.text);
        let tags = self.tagger.tag(client.as_ref(), &masked).await?;

        let mut stored: Vec<(Uuid, String, usize)> = Vec::with_capacity(raw_chunks.len());
        for raw in &raw_chunks {
            let redaction = self.redactor.redact(&raw.text);
            if !redaction.detections.is_empty() {
                debug!(
                    chunk_index = raw.index,
                    detections = redaction.detections.len(),
                    "redacted chunk"
                );
            }
            let chunk_id = self
                .store
                .upsert_chunk(TranscriptChunk {
                    id: Uuid::new_v4(),
                    transcript_id: job.call_id.clone(),
                    chunk_index: raw.index,
                    text: redaction.redacted_text.clone(),
                    tags: tags.topics.clone(),
                    embedding_ref: None,
                })
                .await?;
            stored.push((chunk_id, redaction.redacted_text, raw.index));
        }

        let account_id = match &job.account_id {
            Some(account_id) => account_id,
            None => {
                debug!("call has no account, skipping embedding");
                return Ok(());
            }
        };

        let texts: Vec<String> = stored.iter().map(|(_, text, _)| text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        for ((chunk_id, _, chunk_index), vector) in stored.iter().zip(vectors) {
            self.vector_index
                .upsert(
                    *chunk_id,
                    vector,
                    ChunkMetadata {
                        chunk_id: *chunk_id,
                        call_id: job.call_id.clone(),
                        organization_id: job.organization_id.clone(),
                        account_id: account_id.clone(),
                        chunk_index: *chunk_index,
                        topics: tags.topics.clone(),
                        funnel_stage: tags.funnel_stage.clone(),
                    },
                )
                .await?;
            self.store
                .set_embedding_ref(*chunk_id, &chunk_id.to_string())
                .await?;
        }

        info!(
            chunks = stored.len(),
            topics = tags.topics.len(),
            "processed call"
        );
        Ok(())
    }
}
