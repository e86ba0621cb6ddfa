//! Tessera HTTP Shell
//!
//! A thin axum layer over the pipeline: command dispatch and JSON envelopes
//! only. All real behavior lives in the orchestrator and retrieval crates;
//! this crate owns authentication, per-key rate limiting, request ids,
//! idempotency replay, the Prometheus exposition endpoint, and graceful
//! shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod server;
mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use routes::extract::parse_duration;
pub use server::{build_router, start_server};
pub use state::ServerState;
