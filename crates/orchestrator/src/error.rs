use thiserror::Error;

use staging::FailureCause;

/// Errors surfaced while driving one document through the tiers.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("ingest rejected document: {0}")]
    Ingest(#[from] ingest::IngestError),
    #[error("deterministic extraction failed: {0}")]
    TierA(#[from] deterministic::DeterministicError),
    #[error("graph write failed: {0}")]
    GraphWrite(#[from] graphstore::GraphStoreError),
    #[error("vector write failed: {0}")]
    VectorWrite(#[from] vectorstore::VectorStoreError),
    #[error("illegal state transition: {0}")]
    InvalidState(String),
    #[error("document was canceled")]
    Canceled,
    #[error("document exceeded its {0} s wall clock")]
    Timeout(u64),
    #[error("submission rejected, {0} documents already in flight")]
    Saturated(usize),
    #[error("unknown document: {0}")]
    UnknownDocument(String),
}

impl OrchestratorError {
    /// Map onto the canonical cause code recorded in the DLQ and on the
    /// document.
    pub fn cause(&self) -> FailureCause {
        match self {
            OrchestratorError::Ingest(_) | OrchestratorError::TierA(_) => FailureCause::Parse,
            OrchestratorError::GraphWrite(_) => FailureCause::GraphWrite,
            OrchestratorError::VectorWrite(_) => FailureCause::VectorWrite,
            OrchestratorError::Timeout(_) => FailureCause::Timeout,
            OrchestratorError::InvalidState(_)
            | OrchestratorError::Canceled
            | OrchestratorError::Saturated(_)
            | OrchestratorError::UnknownDocument(_) => FailureCause::Internal,
        }
    }
}
