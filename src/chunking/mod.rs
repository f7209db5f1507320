//! Sentence-aware transcript chunking.
//!
//! A pure, deterministic function over text: the same transcript always
//! yields the same chunk set, which is what makes re-processing a job safe.

use serde::{Deserialize, Serialize};

/// Target chunk size in characters.
pub const TARGET_CHUNK_CHARS: usize = 1500;

/// Trailing overlap carried into the next chunk, in characters.
pub const OVERLAP_CHARS: usize = 200;

/// A raw chunk of transcript text, pre-redaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Order of this chunk within the transcript.
    pub index: usize,
    /// Text content of this chunk.
    pub text: String,
}

/// Split transcript text into ordered, size-bounded chunks.
///
/// Sentences accumulate into a buffer until adding the next one would
/// exceed [`TARGET_CHUNK_CHARS`]; the buffer is then emitted and the next
/// buffer is seeded with the trailing [`OVERLAP_CHARS`] of the previous
/// chunk to preserve cross-boundary context. Text with no sentence
/// boundaries is treated as a single pseudo-sentence and sliced by the
/// same size rule. Every emitted chunk is at most target + overlap long.
pub fn chunk(text: &str) -> Vec<RawChunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<RawChunk> = Vec::new();
    let mut buffer = String::new();

    for sentence in split_sentences(trimmed) {
        // Oversized pseudo-sentences are sliced small enough that an
        // overlap seed plus one piece stays within the chunk size bound.
        for piece in slice_oversized(&sentence, TARGET_CHUNK_CHARS - OVERLAP_CHARS) {
            let piece_len = piece.chars().count();
            let buffer_len = buffer.chars().count();

            if buffer_len > 0 && buffer_len + piece_len > TARGET_CHUNK_CHARS {
                let overlap = trailing_chars(&buffer, OVERLAP_CHARS);
                chunks.push(RawChunk {
                    index: chunks.len(),
                    text: std::mem::take(&mut buffer),
                });
                buffer = overlap;
            }

            if !buffer.is_empty() && !buffer.ends_with(char::is_whitespace) {
                buffer.push(' ');
            }
            buffer.push_str(&piece);
        }
    }

    if !buffer.trim().is_empty() {
        chunks.push(RawChunk {
            index: chunks.len(),
            text: buffer,
        });
    }

    chunks
}

/// Split text into sentences on terminal punctuation followed by
/// whitespace. Input with no boundary comes back whole.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                // Consume trailing whitespace between sentences.
                while chars.peek().is_some_and(|next| next.is_whitespace()) {
                    chars.next();
                }
                let sentence = std::mem::take(&mut current);
                if !sentence.trim().is_empty() {
                    sentences.push(sentence.trim_end().to_string());
                }
            }
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current.trim_end().to_string());
    }

    sentences
}

/// Slice a pseudo-sentence longer than `max_chars` into max-sized pieces on
/// char boundaries.
fn slice_oversized(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Last `n` characters of `s`, on char boundaries.
fn trailing_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        return s.to_string();
    }
    s.chars().skip(count - n).collect()
}
