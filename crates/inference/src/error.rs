use thiserror::Error;

/// Errors surfaced by the structured extractor and its endpoint client.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("invalid inference config: {0}")]
    InvalidConfig(String),
    #[error("endpoint request failed: {0}")]
    Http(String),
    #[error("circuit breaker open for provider '{0}'")]
    CircuitOpen(String),
    #[error("window timed out after {0} s")]
    Timeout(u64),
    #[error("model output failed schema validation: {0}")]
    MalformedOutput(String),
}
