//! Cross-encoder rerank client.
//!
//! Sends `(query, passage)` pairs to the rerank server and returns one score
//! per passage. Accepts both the flat `{"scores": [...]}` layout and the
//! indexed `{"results": [{"index": i, "relevance_score": s}]}` layout.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use staging::{run_with_retry, BackoffPolicy, CircuitBreakerRegistry};

use crate::error::RetrievalError;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .build()
        .expect("reranker HTTP client builds")
});

static CIRCUIT_BREAKERS: Lazy<CircuitBreakerRegistry> =
    Lazy::new(CircuitBreakerRegistry::default);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub endpoint_url: String,
    pub model: String,
    /// Server-side cap on passages per request, fixed at init.
    pub max_batch: usize,
    pub auth_header: Option<String>,
    pub provider: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8082/rerank".into(),
            model: "qwen3-reranker".into(),
            max_batch: 32,
            auth_header: None,
            provider: "reranker".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankClient {
    cfg: RerankConfig,
}

impl RerankClient {
    pub fn new(cfg: RerankConfig) -> Result<Self, RetrievalError> {
        if cfg.endpoint_url.trim().is_empty() {
            return Err(RetrievalError::InvalidConfig("rerank endpoint_url is empty".into()));
        }
        if cfg.max_batch == 0 {
            return Err(RetrievalError::InvalidConfig("rerank max_batch must be > 0".into()));
        }
        Ok(Self { cfg })
    }

    /// Score every passage against the query. Output order matches input
    /// order; scores are whatever the cross-encoder emits (higher = more
    /// relevant).
    pub async fn score(
        &self,
        query: &str,
        passages: &[String],
    ) -> Result<Vec<f32>, RetrievalError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let breaker = CIRCUIT_BREAKERS.get_or_create(&self.cfg.provider);
        if !breaker.allow_request() {
            return Err(RetrievalError::Rerank(format!(
                "circuit breaker open for provider '{}'",
                self.cfg.provider
            )));
        }

        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(self.cfg.max_batch) {
            let payload = json!({
                "model": self.cfg.model,
                "query": query,
                "documents": chunk,
            });
            let url = self.cfg.endpoint_url.clone();
            let auth = self.cfg.auth_header.clone();

            let outcome = run_with_retry(&BackoffPolicy::remote_call(), |_| {
                let url = url.clone();
                let auth = auth.clone();
                let payload = payload.clone();
                async move { send_request(&url, auth.as_deref(), payload).await }
            })
            .await;

            let value = match outcome.into_result() {
                Ok(value) => {
                    breaker.record_success();
                    value
                }
                Err(message) => {
                    breaker.record_failure();
                    return Err(RetrievalError::Rerank(message));
                }
            };

            let batch_scores = parse_scores(value, chunk.len())?;
            scores.extend(batch_scores);
        }
        Ok(scores)
    }
}

async fn send_request(
    url: &str,
    auth_header: Option<&str>,
    payload: Value,
) -> Result<Value, String> {
    let mut request = HTTP_CLIENT.post(url).header("Content-Type", "application/json");
    if let Some(auth) = auth_header {
        request = request.header("Authorization", auth);
    }
    let response = request
        .json(&payload)
        .send()
        .await
        .map_err(|e| format!("HTTP request failed: {e}"))?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("HTTP error {status}: {body}"));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| format!("invalid JSON response: {e}"))
}

fn parse_scores(value: Value, expected: usize) -> Result<Vec<f32>, RetrievalError> {
    if let Some(Value::Array(scores)) = value.get("scores") {
        let parsed: Option<Vec<f32>> = scores.iter().map(|s| s.as_f64().map(|f| f as f32)).collect();
        let parsed =
            parsed.ok_or_else(|| RetrievalError::Rerank("non-numeric score entry".into()))?;
        if parsed.len() != expected {
            return Err(RetrievalError::Rerank(format!(
                "server returned {} scores for {} passages",
                parsed.len(),
                expected
            )));
        }
        return Ok(parsed);
    }

    if let Some(Value::Array(results)) = value.get("results") {
        let mut parsed = vec![0.0f32; expected];
        for item in results {
            let index = item.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX) as usize;
            let score = item
                .get("relevance_score")
                .or_else(|| item.get("score"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;
            if index < expected {
                parsed[index] = score;
            }
        }
        return Ok(parsed);
    }

    Err(RetrievalError::Rerank("unsupported response shape".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_scores_shape() {
        let value = json!({"scores": [0.9, 0.1, 0.5]});
        assert_eq!(parse_scores(value, 3).unwrap(), vec![0.9, 0.1, 0.5]);
    }

    #[test]
    fn indexed_results_shape() {
        let value = json!({"results": [
            {"index": 1, "relevance_score": 0.8},
            {"index": 0, "relevance_score": 0.3}
        ]});
        assert_eq!(parse_scores(value, 2).unwrap(), vec![0.3, 0.8]);
    }

    #[test]
    fn score_count_mismatch_rejected() {
        let value = json!({"scores": [0.9]});
        assert!(parse_scores(value, 2).is_err());
    }

    #[test]
    fn unknown_shape_rejected() {
        assert!(parse_scores(json!({"nope": []}), 1).is_err());
    }

    #[tokio::test]
    async fn empty_passages_short_circuit() {
        let client = RerankClient::new(RerankConfig::default()).unwrap();
        assert!(client.score("q", &[]).await.unwrap().is_empty());
    }
}
