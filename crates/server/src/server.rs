//! Router assembly and server lifecycle.
//!
//! Public routes (`/`, `/health`, `/ready`, `/metrics`) are unauthenticated;
//! everything under `/api/v1` requires an API key and is rate limited per
//! key. Shutdown is graceful on SIGTERM and Ctrl+C.

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{api_key_auth, log_requests, request_id};
use crate::routes::{api_info, documents, extract, health, ingest, not_found, query};
use crate::state::ServerState;

/// Build the router over prepared state.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let protected_routes = Router::new()
        .route("/api/v1/ingest", post(ingest::submit_document))
        .route("/api/v1/ingest/cancel", post(ingest::cancel_job))
        .route("/api/v1/extract/pending", post(extract::run_pending))
        .route("/api/v1/extract/reprocess", post(extract::reprocess))
        .route("/api/v1/extract/status", get(extract::extract_status))
        .route("/api/v1/query", post(query::run_query))
        .route("/api/v1/documents", get(documents::list_documents))
        .route(
            "/api/v1/documents/{doc_id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/v1/status", get(health::status))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until shutdown. The caller builds state (stores, orchestrator,
/// retriever) and installs tracing before this point.
pub async fn start_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.socket_addr()?;
    let app = build_router(state.clone());

    tracing::info!(
        %addr,
        api_keys = state.config.api_keys.len(),
        timeout_secs = state.config.timeout_secs,
        rate_limit_per_minute = state.config.rate_limit_per_minute,
        "starting tessera server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
