use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use ingest::SourceType;
use vectorstore::QueryFilters;

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub sources: Vec<String>,
    /// `YYYY-MM-DD`, inclusive.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Run one hybrid query end to end and answer with citations.
pub async fn run_query(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<QueryRequest>,
) -> ServerResult<impl IntoResponse> {
    if request.question.trim().is_empty() {
        return Err(ServerError::BadRequest("question must not be empty".into()));
    }

    let mut filters = QueryFilters {
        namespace: request.namespace.clone(),
        ..QueryFilters::default()
    };
    for source in &request.sources {
        let parsed = SourceType::from_str(source).map_err(ServerError::BadRequest)?;
        filters.source_types.push(parsed);
    }
    if let Some(after) = &request.after {
        let date = chrono::NaiveDate::parse_from_str(after, "%Y-%m-%d")
            .map_err(|e| ServerError::BadRequest(format!("bad --after date: {e}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ServerError::BadRequest("bad --after date".into()))?;
        filters.ingested_after = Some(chrono::DateTime::from_naive_utc_and_offset(
            midnight,
            chrono::Utc,
        ));
    }

    let bundle = state.retriever.retrieve(&request.question, &filters).await?;
    let answer = state.synthesizer.answer(&request.question, &bundle).await?;

    Ok(Json(json!({
        "answer": answer.answer,
        "sources": answer.sources,
        "latency": answer.latency_breakdown,
        "chunks": bundle.ordered_chunks.len(),
        "subgraph_edges": bundle.graph_subgraph.edges.len(),
    })))
}
