use thiserror::Error;

/// Errors raised while accepting a reader-produced document.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("doc_id must not be empty")]
    EmptyDocId,
    #[error("document text is empty after normalization")]
    EmptyText,
    #[error("content hash mismatch for {doc_id}: reader sent {claimed}, computed {computed}")]
    HashMismatch {
        doc_id: String,
        claimed: String,
        computed: String,
    },
    #[error("document too large: {size} bytes exceeds limit of {limit}")]
    TextTooLarge { size: usize, limit: usize },
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}
