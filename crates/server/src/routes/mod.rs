pub mod documents;
pub mod extract;
pub mod health;
pub mod ingest;
pub mod query;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API information for the root route.
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "service": "tessera-server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "ready": "/ready",
            "metrics": "/metrics",
            "ingest": "/api/v1/ingest",
            "extract": "/api/v1/extract/*",
            "query": "/api/v1/query",
            "documents": "/api/v1/documents",
        }
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "NOT_FOUND",
                "message": "no such route",
            }
        })),
    )
}
