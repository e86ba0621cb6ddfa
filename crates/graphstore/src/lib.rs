//! Tessera Graph Store Layer
//!
//! The only mutator of graph state. Everything else reads.
//!
//! - [`GraphWriter`] applies batched `UNWIND ... MERGE` upserts of nodes and
//!   edges under the catalog's uniqueness constraints, bisecting failing
//!   batches and quarantining unrecoverable rows.
//! - [`GraphTraverser`] runs the bounded breadth-first expansion the hybrid
//!   retriever uses, with fixed edge-type priorities under budget.
//! - [`init`] owns the one-time constraint set; no DDL is issued at steady
//!   state.
//!
//! Correctness comes from store-level uniqueness plus idempotent keying, not
//! from in-process locks: nodes merge on their `uid`, edges on the composite
//! `(type, src, dst, source_doc_id, extractor_version)` key.

mod bolt;
mod error;
pub mod init;
mod traverse;
mod writer;

pub use bolt::{json_to_bolt, prop_to_bolt};
pub use error::GraphStoreError;
pub use traverse::{
    GraphTraverser, Subgraph, SubgraphEdge, SubgraphNode, TraversalConfig,
};
pub use writer::{GraphWriteConfig, GraphWriter, WriteReport};
