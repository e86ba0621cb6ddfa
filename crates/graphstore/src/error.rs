use thiserror::Error;

/// Errors surfaced by the graph store layer.
#[derive(Debug, Clone, Error)]
pub enum GraphStoreError {
    #[error("failed to connect to graph store: {0}")]
    Connect(String),
    #[error("graph query failed: {0}")]
    Query(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("graph write timed out after {0} s")]
    Timeout(u64),
    #[error("unknown type tag in batch: {0}")]
    UnknownTag(String),
}
