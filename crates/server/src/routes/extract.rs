use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

/// Drive the worker pool over everything currently queued.
pub async fn run_pending(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let orchestrator = state.orchestrator.clone();
    orchestrator.run_until_drained().await;
    let reclaimed = orchestrator.reclaim_stale();
    Ok(Json(json!({
        "drained": true,
        "reclaimed": reclaimed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReprocessRequest {
    /// Duration like `24h`, `7d`, or `90m`.
    pub since: String,
}

/// Reset documents updated inside the window back to `pending`.
pub async fn reprocess(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ReprocessRequest>,
) -> ServerResult<impl IntoResponse> {
    let window = parse_duration(&request.since)
        .ok_or_else(|| ServerError::BadRequest(format!("unparseable duration: {}", request.since)))?;
    let since = chrono::Utc::now()
        - chrono::Duration::from_std(window)
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let doc_ids = state.orchestrator.reprocess_since(since);
    Ok(Json(json!({
        "reset": doc_ids.len(),
        "doc_ids": doc_ids,
    })))
}

/// Live extraction counters.
pub async fn extract_status(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
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
        "by_state": by_state,
        "by_cause": by_cause,
        "dlq": {"pending": depths.pending, "failed": depths.failed},
    })))
}

/// `"90m" | "24h" | "7d" | "3600s"` to a duration.
pub fn parse_duration(input: &str) -> Option<std::time::Duration> {
    let input = input.trim();
    let (value, unit) = input.split_at(input.len().checked_sub(1)?);
    let value: u64 = value.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return None,
    };
    Some(std::time::Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("90m"), Some(std::time::Duration::from_secs(5400)));
        assert_eq!(parse_duration("24h"), Some(std::time::Duration::from_secs(86_400)));
        assert_eq!(parse_duration("7d"), Some(std::time::Duration::from_secs(604_800)));
        assert_eq!(parse_duration("30s"), Some(std::time::Duration::from_secs(30)));
        assert!(parse_duration("7w").is_none());
        assert!(parse_duration("").is_none());
        assert!(parse_duration("h").is_none());
    }
}
