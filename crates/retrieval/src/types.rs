//! Query-path value model.

use serde::{Deserialize, Serialize};

use graphstore::Subgraph;
use vectorstore::ChunkHit;

/// Wall-clock split of one query, stage by stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub embed_ms: u64,
    pub vector_ms: u64,
    pub rerank_ms: u64,
    pub graph_ms: u64,
    pub synthesis_ms: u64,
}

impl LatencyBreakdown {
    pub fn total_ms(&self) -> u64 {
        self.embed_ms + self.vector_ms + self.rerank_ms + self.graph_ms + self.synthesis_ms
    }
}

/// The merged context handed to the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalBundle {
    /// Rerank-ordered surviving chunks.
    pub ordered_chunks: Vec<ChunkHit>,
    pub graph_subgraph: Subgraph,
    pub query_latency_breakdown: LatencyBreakdown,
}

impl RetrievalBundle {
    pub fn is_empty(&self) -> bool {
        self.ordered_chunks.is_empty() && self.graph_subgraph.is_empty()
    }
}

/// The synthesizer's answer with its citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub answer: String,
    /// `(citation index, source url or doc id)` pairs, one per cited chunk.
    pub sources: Vec<(usize, String)>,
    pub latency_breakdown: LatencyBreakdown,
}
