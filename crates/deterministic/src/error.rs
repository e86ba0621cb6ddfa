use thiserror::Error;

/// Errors surfaced by Tier A extraction. Per-block parse problems are not
/// errors; they are recorded as warnings on the output and extraction
/// continues.
#[derive(Debug, Clone, Error)]
pub enum DeterministicError {
    /// Catastrophic parse failure that invalidates the whole document.
    #[error("document parse failure: {0}")]
    Parse(String),
    #[error("internal extraction failure: {0}")]
    Internal(String),
}
