//! The hybrid query pipeline: embed, filtered kNN, cross-encoder rerank,
//! bounded graph expansion, bundle assembly. Deterministic end to end: the
//! embedder and reranker are deterministic for a given input, and every
//! tie-break is `(score desc, chunk_id asc)`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, instrument, Instrument};

use graphstore::{GraphTraverser, Subgraph};
use vectorstore::{ChunkHit, EmbedClient, QueryFilters, VectorCollection};

use crate::error::RetrievalError;
use crate::reranker::RerankClient;
use crate::types::{LatencyBreakdown, RetrievalBundle};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// kNN candidate count before rerank.
    pub top_k: usize,
    /// Survivors kept after rerank.
    pub rerank_top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            rerank_top_n: 5,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.top_k == 0 {
            return Err(RetrievalError::InvalidConfig("top_k must be > 0".into()));
        }
        if self.rerank_top_n == 0 || self.rerank_top_n > self.top_k {
            return Err(RetrievalError::InvalidConfig(format!(
                "rerank_top_n {} must be in 1..=top_k ({})",
                self.rerank_top_n, self.top_k
            )));
        }
        Ok(())
    }
}

pub struct HybridRetriever {
    embedder: Arc<EmbedClient>,
    collection: Arc<VectorCollection>,
    reranker: Arc<RerankClient>,
    traverser: Arc<GraphTraverser>,
    cfg: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<EmbedClient>,
        collection: Arc<VectorCollection>,
        reranker: Arc<RerankClient>,
        traverser: Arc<GraphTraverser>,
        cfg: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        cfg.validate()?;
        Ok(Self {
            embedder,
            collection,
            reranker,
            traverser,
            cfg,
        })
    }

    /// Run the full retrieval pipeline for one question.
    #[instrument(skip(self, filters), fields(top_k = self.cfg.top_k))]
    pub async fn retrieve(
        &self,
        question: &str,
        filters: &QueryFilters,
    ) -> Result<RetrievalBundle, RetrievalError> {
        let mut latency = LatencyBreakdown::default();

        // Embed with the ingest-side embedder so dimensionality matches.
        let started = Instant::now();
        let query_vector = self
            .embedder
            .embed_query(question)
            .instrument(info_span!("embed"))
            .await
            .map_err(|e| RetrievalError::Embed(e.to_string()))?;
        latency.embed_ms = started.elapsed().as_millis() as u64;

        // Filtered kNN.
        let started = Instant::now();
        let candidates = self
            .collection
            .search(&query_vector, filters, self.cfg.top_k)
            .instrument(info_span!("vector.search"))
            .await?;
        latency.vector_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("tessera_query_vector_ms").record(latency.vector_ms as f64);

        if candidates.is_empty() {
            info!("vector search returned no candidates");
            return Ok(RetrievalBundle {
                ordered_chunks: Vec::new(),
                graph_subgraph: Subgraph::default(),
                query_latency_breakdown: latency,
            });
        }

        // Cross-encoder rerank, keep the top N.
        let started = Instant::now();
        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self
            .reranker
            .score(question, &passages)
            .instrument(info_span!("rerank"))
            .await?;
        let ordered_chunks = apply_rerank(candidates, &scores, self.cfg.rerank_top_n);
        latency.rerank_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("tessera_query_rerank_ms").record(latency.rerank_ms as f64);

        // Bounded graph expansion seeded from the surviving documents.
        let started = Instant::now();
        let mut seeds: Vec<String> = Vec::new();
        let doc_ids: BTreeSet<&str> =
            ordered_chunks.iter().map(|c| c.doc_id.as_str()).collect();
        for doc_id in doc_ids {
            for seed in self.traverser.seed_entities(doc_id).await? {
                if !seeds.contains(&seed) {
                    seeds.push(seed);
                }
            }
        }
        let graph_subgraph = self
            .traverser
            .expand(&seeds)
            .instrument(info_span!("graph.traverse"))
            .await?;
        latency.graph_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("tessera_query_graph_ms").record(latency.graph_ms as f64);

        info!(
            chunks = ordered_chunks.len(),
            subgraph_nodes = graph_subgraph.nodes.len(),
            subgraph_edges = graph_subgraph.edges.len(),
            "retrieval bundle assembled"
        );
        Ok(RetrievalBundle {
            ordered_chunks,
            graph_subgraph,
            query_latency_breakdown: latency,
        })
    }
}

/// Re-order candidates by cross-encoder score and keep the best `top_n`.
/// Ties break by ascending chunk id so results never shuffle between runs.
fn apply_rerank(candidates: Vec<ChunkHit>, scores: &[f32], top_n: usize) -> Vec<ChunkHit> {
    let mut scored: Vec<ChunkHit> = candidates
        .into_iter()
        .zip(scores.iter())
        .map(|(mut hit, score)| {
            hit.score = *score;
            hit
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(top_n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: &str, doc_id: &str, score: f32) -> ChunkHit {
        ChunkHit {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            source_type: "web".into(),
            ordinal: 0,
            text: format!("text of {chunk_id}"),
            score,
            namespace: "default".into(),
        }
    }

    #[test]
    fn rerank_reorders_and_truncates() {
        let candidates = vec![hit("a", "d1", 0.9), hit("b", "d2", 0.8), hit("c", "d3", 0.7)];
        let reranked = apply_rerank(candidates, &[0.1, 0.95, 0.5], 2);
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].chunk_id, "b");
        assert_eq!(reranked[1].chunk_id, "c");
        assert_eq!(reranked[0].score, 0.95);
    }

    #[test]
    fn ties_break_by_chunk_id() {
        let candidates = vec![hit("zeta", "d1", 0.0), hit("alpha", "d2", 0.0)];
        let reranked = apply_rerank(candidates, &[0.5, 0.5], 2);
        assert_eq!(reranked[0].chunk_id, "alpha");
        assert_eq!(reranked[1].chunk_id, "zeta");
    }

    #[test]
    fn config_bounds_checked() {
        assert!(RetrievalConfig::default().validate().is_ok());
        assert!(RetrievalConfig { top_k: 0, rerank_top_n: 1 }.validate().is_err());
        assert!(RetrievalConfig { top_k: 5, rerank_top_n: 6 }.validate().is_err());
    }
}
