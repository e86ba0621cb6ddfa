use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::ServerResult;
use crate::state::ServerState;

static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME.elapsed().map(|d| d.as_secs()).unwrap_or(0)
}

/// Liveness: 200 whenever the process is up.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "tessera-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness: queue and store collaborator visibility.
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let depths = state.dlq.depths();
    Ok(Json(json!({
        "status": "ready",
        "service": "tessera-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "api": "ready",
            "dlq_pending": depths.pending,
            "dlq_failed": depths.failed,
        }
    })))
}

/// Prometheus exposition.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.prometheus.render()
}

/// Collaborator health and queue depths for the `status` surface.
pub async fn status(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let ledger = state.orchestrator.ledger();
    let by_state: Vec<_> = ledger
        .counts_by_state()
        .into_iter()
        .map(|(s, n)| json!({"state": s.as_str(), "count": n}))
        .collect();
    let by_cause: Vec<_> = ledger
        .counts_by_cause()
        .into_iter()
        .map(|(c, n)| json!({"cause": c.as_str(), "count": n}))
        .collect();
    let depths = state.dlq.depths();

    Ok(Json(json!({
        "documents": by_state,
        "failures": by_cause,
        "dlq": {"pending": depths.pending, "failed": depths.failed},
        "in_flight": ledger.in_flight(),
        "uptime_seconds": uptime_seconds(),
    })))
}
