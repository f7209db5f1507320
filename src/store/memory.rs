//! In-memory transcript store implementation.

use super::{CallMeta, Citation, Transcript, TranscriptChunk, TranscriptStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory transcript store for tests and single-process use.
pub struct MemoryTranscriptStore {
    transcripts: RwLock<HashMap<String, Transcript>>,
    chunks: RwLock<HashMap<(String, usize), TranscriptChunk>>,
    calls: RwLock<HashMap<String, CallMeta>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self {
            transcripts: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            calls: RwLock::new(HashMap::new()),
        }
    }

    /// Total stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }
}

impl Default for MemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn get_transcript(&self, call_id: &str) -> Result<Option<Transcript>> {
        Ok(self.transcripts.read().unwrap().get(call_id).cloned())
    }

    async fn store_transcript(&self, transcript: Transcript) -> Result<()> {
        self.transcripts
            .write()
            .unwrap()
            .insert(transcript.call_id.clone(), transcript);
        Ok(())
    }

    async fn upsert_chunk(&self, mut chunk: TranscriptChunk) -> Result<Uuid> {
        let key = (chunk.transcript_id.clone(), chunk.chunk_index);
        let mut chunks = self.chunks.write().unwrap();

        if let Some(existing) = chunks.get(&key) {
            chunk.id = existing.id;
        }
        let id = chunk.id;
        chunks.insert(key, chunk);
        Ok(id)
    }

    async fn get_chunks(&self, transcript_id: &str) -> Result<Vec<TranscriptChunk>> {
        let chunks = self.chunks.read().unwrap();
        let mut result: Vec<TranscriptChunk> = chunks
            .values()
            .filter(|c| c.transcript_id == transcript_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.chunk_index);
        Ok(result)
    }

    async fn set_embedding_ref(&self, chunk_id: Uuid, embedding_ref: &str) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        for chunk in chunks.values_mut() {
            if chunk.id == chunk_id {
                chunk.embedding_ref = Some(embedding_ref.to_string());
            }
        }
        Ok(())
    }

    async fn store_call_meta(&self, meta: CallMeta) -> Result<()> {
        self.calls
            .write()
            .unwrap()
            .insert(meta.call_id.clone(), meta);
        Ok(())
    }

    async fn get_citation(&self, chunk_id: Uuid) -> Result<Option<Citation>> {
        let chunks = self.chunks.read().unwrap();
        let Some(chunk) = chunks.values().find(|c| c.id == chunk_id).cloned() else {
            return Ok(None);
        };

        let calls = self.calls.read().unwrap();
        let call = match calls.get(&chunk.transcript_id) {
            Some(meta) => meta.clone(),
            None => CallMeta {
                call_id: chunk.transcript_id.clone(),
                title: "Untitled call".to_string(),
                occurred_at: chrono::Utc::now(),
                speaker: "Unknown".to_string(),
            },
        };

        Ok(Some(Citation { chunk, call }))
    }
}
