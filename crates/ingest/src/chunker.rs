//! Semantic chunking.
//!
//! Splits a document into fixed-budget token slices for embedding. Ordinals
//! are contiguous from zero and chunks are never mutated after creation;
//! re-chunking a changed document produces a fresh set under new vector ids.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::types::NormalizedDocument;

/// Namespace for deterministic chunk ids (UUIDv5 over `doc_id:ordinal`).
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// One 512-token (by default) slice of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    /// Position within the document, contiguous from 0.
    pub ordinal: u32,
    pub text: String,
    pub token_count: usize,
    /// Word-token span inside the parent document.
    pub token_span: (usize, usize),
}

impl Chunk {
    /// Identifier under which the embedding is stored in the vector
    /// collection. Deterministic so re-ingest overwrites in place.
    pub fn embedding_vector_id(&self) -> String {
        self.chunk_id.clone()
    }
}

/// Split `doc.text` into chunks of at most `cfg.chunk_tokens` word tokens.
///
/// Tokens are unicode word boundaries; an empty document yields no chunks.
pub fn chunk_document(doc: &NormalizedDocument, cfg: &IngestConfig) -> Vec<Chunk> {
    let budget = cfg.chunk_tokens.max(1);
    let words: Vec<&str> = doc.text.unicode_words().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(words.len().div_ceil(budget));
    for (ordinal, window) in words.chunks(budget).enumerate() {
        let start = ordinal * budget;
        let end = start + window.len();
        let text = window.join(" ");
        let chunk_id =
            Uuid::new_v5(&CHUNK_ID_NAMESPACE, format!("{}:{ordinal}", doc.doc_id).as_bytes())
                .to_string();
        chunks.push(Chunk {
            chunk_id,
            doc_id: doc.doc_id.clone(),
            ordinal: ordinal as u32,
            token_count: window.len(),
            token_span: (start, end),
            text,
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::hash::content_hash;
    use crate::types::SourceType;

    fn doc(text: &str) -> NormalizedDocument {
        NormalizedDocument {
            doc_id: "doc-chunk".into(),
            source_type: SourceType::Web,
            source_url: None,
            ingested_at: Utc::now(),
            content_hash: content_hash(text),
            text: text.into(),
            sub_structures: Vec::new(),
        }
    }

    fn cfg(tokens: usize) -> IngestConfig {
        IngestConfig {
            chunk_tokens: tokens,
            ..IngestConfig::default()
        }
    }

    #[test]
    fn ordinals_contiguous_from_zero() {
        let words: Vec<String> = (0..1000).map(|i| format!("word{i}")).collect();
        let chunks = chunk_document(&doc(&words.join(" ")), &cfg(128));
        assert_eq!(chunks.len(), 8);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal as usize, i);
        }
        assert_eq!(chunks.last().unwrap().token_count, 1000 - 7 * 128);
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(chunk_document(&doc(""), &cfg(512)).is_empty());
        assert!(chunk_document(&doc("   \n "), &cfg(512)).is_empty());
    }

    #[test]
    fn chunk_count_is_ceiling_of_token_count() {
        let words: Vec<String> = (0..513).map(|i| format!("w{i}")).collect();
        let chunks = chunk_document(&doc(&words.join(" ")), &cfg(512));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].token_count, 1);
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let d = doc("alpha beta gamma");
        let first = chunk_document(&d, &cfg(2));
        let second = chunk_document(&d, &cfg(2));
        assert_eq!(first, second);
        assert_ne!(first[0].chunk_id, first[1].chunk_id);
    }

    #[test]
    fn token_spans_tile_the_document() {
        let words: Vec<String> = (0..300).map(|i| format!("w{i}")).collect();
        let chunks = chunk_document(&doc(&words.join(" ")), &cfg(100));
        assert_eq!(chunks[0].token_span, (0, 100));
        assert_eq!(chunks[1].token_span, (100, 200));
        assert_eq!(chunks[2].token_span, (200, 300));
    }
}
