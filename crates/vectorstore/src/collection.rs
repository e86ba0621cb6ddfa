//! Qdrant collection access: init-time provisioning, batched upserts, and
//! filtered kNN search. The collection schema (cosine distance, embedder
//! dimension, HNSW parameters) is fixed when `init` runs and never mutated
//! online.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, Filter,
    HnswConfigDiffBuilder, PointStruct, QueryPointsBuilder, Range,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::qdrant::Distance;
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::VectorStoreError;
use crate::types::{ChunkHit, EmbeddedChunk, QueryFilters};

/// Collection-side configuration, frozen at init.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorCollectionConfig {
    pub url: String,
    pub collection: String,
    pub dimension: usize,
    /// Upsert batch size, tuned to network latency (50-500).
    pub upsert_batch: usize,
    pub hnsw_m: u64,
    pub hnsw_ef_construct: u64,
    pub api_key: Option<String>,
}

impl Default for VectorCollectionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".into(),
            collection: "tessera_chunks".into(),
            dimension: 1024,
            upsert_batch: 200,
            hnsw_m: 16,
            hnsw_ef_construct: 200,
            api_key: None,
        }
    }
}

impl VectorCollectionConfig {
    pub fn validate(&self) -> Result<(), VectorStoreError> {
        if self.dimension == 0 {
            return Err(VectorStoreError::InvalidConfig("dimension must be > 0".into()));
        }
        if !(1..=10_000).contains(&self.upsert_batch) {
            return Err(VectorStoreError::InvalidConfig(format!(
                "upsert_batch {} out of range",
                self.upsert_batch
            )));
        }
        Ok(())
    }
}

/// Handle over the chunk collection. The writer side is the only mutator of
/// vector state.
pub struct VectorCollection {
    client: Qdrant,
    cfg: VectorCollectionConfig,
}

impl VectorCollection {
    pub fn connect(cfg: VectorCollectionConfig) -> Result<Self, VectorStoreError> {
        cfg.validate()?;
        let mut builder = Qdrant::from_url(&cfg.url);
        if let Some(key) = &cfg.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| VectorStoreError::Store(format!("client build failed: {e}")))?;
        Ok(Self { client, cfg })
    }

    /// Create the collection when missing. Schema is fixed here: cosine
    /// distance, the embedder's dimension, HNSW m/ef_construct.
    pub async fn ensure_collection(&self) -> Result<bool, VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.cfg.collection)
            .await
            .map_err(|e| VectorStoreError::Store(e.to_string()))?;
        if exists {
            return Ok(false);
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.cfg.collection)
                    .vectors_config(
                        VectorParamsBuilder::new(self.cfg.dimension as u64, Distance::Cosine)
                            .build(),
                    )
                    .hnsw_config(
                        HnswConfigDiffBuilder::default()
                            .m(self.cfg.hnsw_m)
                            .ef_construct(self.cfg.hnsw_ef_construct)
                            .build(),
                    ),
            )
            .await
            .map_err(|e| VectorStoreError::Store(format!("create collection: {e}")))?;
        info!(collection = %self.cfg.collection, dim = self.cfg.dimension, "vector collection created");
        Ok(true)
    }

    pub async fn health_check(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| VectorStoreError::Store(e.to_string()))
    }

    /// Upsert embedded chunks in configured batches.
    pub async fn upsert_chunks(&self, chunks: &[EmbeddedChunk]) -> Result<usize, VectorStoreError> {
        let mut written = 0usize;
        for batch in chunks.chunks(self.cfg.upsert_batch.max(1)) {
            let points: Vec<PointStruct> = batch.iter().map(|c| self.point_of(c)).collect::<Result<_, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.cfg.collection, points))
                .await
                .map_err(|e| VectorStoreError::Store(format!("upsert failed: {e}")))?;
            written += batch.len();
            debug!(batch = batch.len(), "vector batch upserted");
        }
        metrics::counter!("tessera_vector_upserts_total").increment(written as u64);
        Ok(written)
    }

    fn point_of(&self, chunk: &EmbeddedChunk) -> Result<PointStruct, VectorStoreError> {
        if chunk.vector.len() != self.cfg.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.cfg.dimension,
                got: chunk.vector.len(),
            });
        }
        let payload: Payload = payload_of(chunk);
        Ok(PointStruct::new(
            chunk.chunk.embedding_vector_id(),
            chunk.vector.clone(),
            payload,
        ))
    }

    /// Filtered kNN. Results come back score-descending; ties are broken by
    /// chunk id so repeated queries stay stable.
    pub async fn search(
        &self,
        vector: &[f32],
        filters: &QueryFilters,
        top_k: usize,
    ) -> Result<Vec<ChunkHit>, VectorStoreError> {
        let mut builder = QueryPointsBuilder::new(&self.cfg.collection)
            .query(vector.to_vec())
            .limit(top_k as u64)
            .with_payload(true);
        if let Some(filter) = filter_of(filters) {
            builder = builder.filter(filter);
        }

        let response = self
            .client
            .query(builder)
            .await
            .map_err(|e| VectorStoreError::Store(format!("search failed: {e}")))?;

        let mut hits: Vec<ChunkHit> = response
            .result
            .into_iter()
            .map(|point| {
                let payload: HashMap<String, QdrantValue> = point.payload.into_iter().collect();
                let chunk_id = match point.id.map(|p| p.point_id_options) {
                    Some(Some(PointIdOptions::Uuid(uuid))) => uuid,
                    Some(Some(PointIdOptions::Num(n))) => n.to_string(),
                    _ => String::new(),
                };
                ChunkHit {
                    chunk_id,
                    doc_id: str_field(&payload, "doc_id"),
                    source_type: str_field(&payload, "source_type"),
                    ordinal: int_field(&payload, "chunk_ordinal") as u32,
                    text: str_field(&payload, "text"),
                    score: point.score,
                    namespace: str_field(&payload, "namespace"),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        Ok(hits)
    }
}

/// Frozen payload keys: doc_id, source_type, ingested_at, chunk_ordinal,
/// token_span, namespace, tags, text.
fn payload_of(chunk: &EmbeddedChunk) -> Payload {
    Payload::try_from(json!({
        "doc_id": chunk.chunk.doc_id,
        "source_type": chunk.source_type.as_str(),
        "ingested_at": chunk.ingested_at.timestamp(),
        "chunk_ordinal": chunk.chunk.ordinal,
        "token_span": [chunk.chunk.token_span.0, chunk.chunk.token_span.1],
        "namespace": chunk.namespace,
        "tags": chunk.tags,
        "text": chunk.chunk.text,
    }))
    .unwrap_or_else(|_| Payload::new())
}

fn filter_of(filters: &QueryFilters) -> Option<Filter> {
    if filters.is_empty() {
        return None;
    }
    let mut must: Vec<Condition> = Vec::new();

    if !filters.source_types.is_empty() {
        let should: Vec<Condition> = filters
            .source_types
            .iter()
            .map(|s| Condition::matches("source_type", s.as_str().to_string()))
            .collect();
        must.push(Filter::should(should).into());
    }
    if let Some(after) = filters.ingested_after {
        must.push(Condition::range(
            "ingested_at",
            Range {
                gte: Some(after.timestamp() as f64),
                ..Range::default()
            },
        ));
    }
    if let Some(namespace) = &filters.namespace {
        must.push(Condition::matches("namespace", namespace.clone()));
    }
    Some(Filter::must(must))
}

fn str_field(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn int_field(payload: &HashMap<String, QdrantValue>, key: &str) -> i64 {
    payload.get(key).and_then(|v| v.as_integer()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ingest::SourceType;

    #[test]
    fn filters_build_only_when_present() {
        assert!(filter_of(&QueryFilters::default()).is_none());

        let filters = QueryFilters {
            source_types: vec![SourceType::Web, SourceType::DockerCompose],
            ingested_after: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            namespace: Some("homelab".into()),
        };
        let filter = filter_of(&filters).expect("filter built");
        assert_eq!(filter.must.len(), 3);
    }

    #[test]
    fn config_rejects_zero_dimension() {
        let cfg = VectorCollectionConfig {
            dimension: 0,
            ..VectorCollectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn batch_bounds_enforced() {
        let cfg = VectorCollectionConfig {
            upsert_batch: 0,
            ..VectorCollectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
