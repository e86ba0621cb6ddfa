//! Tessera Retrieval Layer
//!
//! The query path: embed the question with the ingest-side embedder, run
//! filtered kNN over the chunk collection, rerank the candidates with a
//! cross-encoder, expand the graph neighborhood of the surviving documents,
//! and synthesize a grounded, citation-bearing answer.
//!
//! Determinism is a contract here: same question, same corpus, same answer
//! bundle. Tie-breaks are always `(score desc, chunk_id asc)` and an empty
//! bundle always produces the fixed "insufficient evidence" reply.

mod error;
mod reranker;
mod retriever;
mod synthesizer;
mod types;

pub use error::RetrievalError;
pub use reranker::{RerankClient, RerankConfig};
pub use retriever::{HybridRetriever, RetrievalConfig};
pub use synthesizer::{Synthesizer, SynthesizerConfig, INSUFFICIENT_EVIDENCE};
pub use types::{LatencyBreakdown, RetrievalBundle, SynthesizedAnswer};
