//! Payload model for the chunk collection.
//!
//! Payload keys are frozen at init; metadata filters may use these keys and
//! no others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ingest::{Chunk, SourceType};

/// A chunk paired with its embedding, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub source_type: SourceType,
    pub ingested_at: DateTime<Utc>,
    pub namespace: String,
    pub tags: Vec<String>,
}

/// One kNN hit after payload extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub doc_id: String,
    pub source_type: String,
    pub ordinal: u32,
    pub text: String,
    pub score: f32,
    pub namespace: String,
}

/// Optional query-side constraints, mapped onto payload filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub source_types: Vec<SourceType>,
    pub ingested_after: Option<DateTime<Utc>>,
    pub namespace: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.source_types.is_empty() && self.ingested_after.is_none() && self.namespace.is_none()
    }
}
