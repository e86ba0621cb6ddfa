use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;

use graphstore::GraphWriter;
use orchestrator::Orchestrator;
use retrieval::{HybridRetriever, Synthesizer};
use staging::DeadLetterQueue;

use crate::config::ServerConfig;

/// Shared application state.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window start).
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,

    /// `Idempotency-Key` dedup: key -> (first seen, original job id).
    pub idempotency: Arc<DashMap<String, (Instant, String)>>,

    pub orchestrator: Arc<Orchestrator>,
    pub retriever: Arc<HybridRetriever>,
    pub synthesizer: Arc<Synthesizer>,
    pub dlq: Arc<DeadLetterQueue>,
    pub graph: Arc<GraphWriter>,

    /// Rendered by the /metrics endpoint.
    pub prometheus: PrometheusHandle,
}

impl ServerState {
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Sliding one-minute window per key.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Original job id for a replayed idempotency key, if still inside the
    /// dedup window.
    pub fn lookup_idempotent(&self, key: &str) -> Option<String> {
        let entry = self.idempotency.get(key)?;
        let (seen_at, original) = entry.value();
        (Instant::now().duration_since(*seen_at) < self.config.idempotency_window())
            .then(|| original.clone())
    }

    pub fn record_idempotent(&self, key: &str, job_id: &str) {
        self.idempotency
            .insert(key.to_string(), (Instant::now(), job_id.to_string()));
    }
}
