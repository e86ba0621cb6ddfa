//! Tessera Vector Store Layer
//!
//! The embedding client and the chunk collection. Chunks flow in from the
//! ingest chunker, get embedded in server-sized batches, and are upserted
//! into one Qdrant collection whose schema (cosine distance, embedder
//! dimension, HNSW parameters) is fixed at init. Point ids are the
//! deterministic chunk ids, so re-ingesting a document overwrites its
//! vectors in place.
//!
//! Query-side, [`VectorCollection::search`] runs filtered kNN under the
//! frozen payload keys; everything else about retrieval lives downstream.

mod collection;
mod embedder;
mod error;
mod types;

pub use collection::{VectorCollection, VectorCollectionConfig};
pub use embedder::{EmbedClient, EmbedConfig};
pub use error::VectorStoreError;
pub use types::{ChunkHit, EmbeddedChunk, QueryFilters};
