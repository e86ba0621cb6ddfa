use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// HTTP shell error type with stable error codes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Pipeline saturated, retry later")]
    Saturated,

    #[error("Ingest error: {0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("Extraction error: {0}")]
    Orchestrator(String),

    #[error("Query error: {0}")]
    Retrieval(#[from] retrieval::RetrievalError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::RateLimitExceeded | ServerError::Saturated => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Ingest(_) | ServerError::Orchestrator(_) | ServerError::Retrieval(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ServerError::Saturated => "SATURATED",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Ingest(_) => "INGEST_ERROR",
            ServerError::Orchestrator(_) => "EXTRACTION_ERROR",
            ServerError::Retrieval(_) => "QUERY_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl From<orchestrator::OrchestratorError> for ServerError {
    fn from(err: orchestrator::OrchestratorError) -> Self {
        match err {
            orchestrator::OrchestratorError::Saturated(_) => ServerError::Saturated,
            other => ServerError::Orchestrator(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("JSON parse error: {err}"))
    }
}
