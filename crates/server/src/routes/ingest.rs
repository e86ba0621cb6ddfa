use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use ingest::NormalizedDocument;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub document: NormalizedDocument,
}

/// Enqueue one normalized document for extraction. Honors the optional
/// `Idempotency-Key` header: a replay inside the dedup window returns the
/// original job id instead of enqueueing again.
pub async fn submit_document(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> ServerResult<impl IntoResponse> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(key) = &idempotency_key {
        if let Some(original) = state.lookup_idempotent(key) {
            return Ok(Json(json!({
                "job_id": original,
                "deduplicated": true,
            })));
        }
    }

    let job_id = state.orchestrator.submit(request.document).await?;
    if let Some(key) = &idempotency_key {
        state.record_idempotent(key, &job_id);
    }

    Ok(Json(json!({
        "job_id": job_id,
        "deduplicated": false,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

/// Cancel a job at its next suspension point.
pub async fn cancel_job(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CancelRequest>,
) -> ServerResult<impl IntoResponse> {
    if request.job_id.trim().is_empty() {
        return Err(ServerError::BadRequest("job_id must not be empty".into()));
    }
    let canceled = state.orchestrator.cancel(&request.job_id);
    if !canceled {
        return Err(ServerError::NotFound);
    }
    Ok(Json(json!({"job_id": request.job_id, "canceled": true})))
}
