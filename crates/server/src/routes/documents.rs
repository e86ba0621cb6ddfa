use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use ingest::{ExtractionState, SourceType};

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub source_type: Option<String>,
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Paginated document listing with optional state/source filters.
pub async fn list_documents(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListParams>,
) -> ServerResult<impl IntoResponse> {
    let state_filter = params
        .state
        .as_deref()
        .map(ExtractionState::from_str)
        .transpose()
        .map_err(ServerError::BadRequest)?;
    let source_filter = params
        .source_type
        .as_deref()
        .map(SourceType::from_str)
        .transpose()
        .map_err(ServerError::BadRequest)?;

    let ledger = state.orchestrator.ledger();
    let rows = ledger.list(state_filter, source_filter, params.limit.min(500), params.offset);
    let documents: Vec<_> = rows
        .iter()
        .map(|d| {
            json!({
                "doc_id": d.doc_id,
                "job_id": d.job_id,
                "source_type": d.source_type.as_str(),
                "state": d.state.as_str(),
                "cause": d.cause.map(|c| c.as_str()),
                "attempt": d.attempt,
                "updated_at": d.updated_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(json!({
        "documents": documents,
        "limit": params.limit.min(500),
        "offset": params.offset,
    })))
}

/// Admin purge: delete the edges keyed to this document (all extractor
/// versions) and its Document node. Shared entity nodes stay.
pub async fn delete_document(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(doc_id): axum::extract::Path<String>,
) -> ServerResult<impl IntoResponse> {
    let ledger = state.orchestrator.ledger();
    if ledger.get(&doc_id).is_none() {
        return Err(ServerError::NotFound);
    }
    state
        .graph
        .purge_document(&doc_id)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(json!({"doc_id": doc_id, "purged": true})))
}

/// Single document detail with its event history.
pub async fn get_document(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(doc_id): axum::extract::Path<String>,
) -> ServerResult<impl IntoResponse> {
    let ledger = state.orchestrator.ledger();
    let status = ledger.get(&doc_id).ok_or(ServerError::NotFound)?;
    let events: Vec<_> = ledger
        .events_for(&doc_id)
        .iter()
        .map(|e| {
            json!({
                "from": e.from.as_str(),
                "to": e.to.as_str(),
                "reason": e.reason,
                "attempt": e.attempt,
                "at": e.at.to_rfc3339(),
            })
        })
        .collect();

    Ok(Json(json!({
        "doc_id": status.doc_id,
        "state": status.state.as_str(),
        "source_type": status.source_type.as_str(),
        "content_hash": status.content_hash,
        "cause": status.cause.map(|c| c.as_str()),
        "events": events,
    })))
}
