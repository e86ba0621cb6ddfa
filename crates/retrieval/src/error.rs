use thiserror::Error;

/// Errors surfaced by the query path.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),
    #[error("embedding failed: {0}")]
    Embed(String),
    #[error("vector search failed: {0}")]
    VectorSearch(String),
    #[error("rerank failed: {0}")]
    Rerank(String),
    #[error("graph expansion failed: {0}")]
    Graph(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

impl From<vectorstore::VectorStoreError> for RetrievalError {
    fn from(err: vectorstore::VectorStoreError) -> Self {
        RetrievalError::VectorSearch(err.to_string())
    }
}

impl From<graphstore::GraphStoreError> for RetrievalError {
    fn from(err: graphstore::GraphStoreError) -> Self {
        RetrievalError::Graph(err.to_string())
    }
}
