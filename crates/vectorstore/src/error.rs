use thiserror::Error;

/// Errors surfaced by the embedding client and the vector collection layer.
#[derive(Debug, Clone, Error)]
pub enum VectorStoreError {
    #[error("invalid vector config: {0}")]
    InvalidConfig(String),
    #[error("embedding request failed: {0}")]
    Embed(String),
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("vector store request failed: {0}")]
    Store(String),
    #[error("circuit breaker open for provider '{0}'")]
    CircuitOpen(String),
}
