//! Remote embedding client.
//!
//! Batch-in, vectors-out over HTTP, with the shared retry ladder and a
//! per-provider circuit breaker. Both of the common response layouts are
//! accepted: a bare `{"embeddings": [[...]]}` array and the
//! `{"data": [{"embedding": [...]}]}` object form.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use staging::{run_with_retry, BackoffPolicy, CircuitBreakerRegistry};

use crate::error::VectorStoreError;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .expect("embedder HTTP client builds")
});

static CIRCUIT_BREAKERS: Lazy<CircuitBreakerRegistry> =
    Lazy::new(CircuitBreakerRegistry::default);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub endpoint_url: String,
    pub model: String,
    /// Fixed at init; every produced vector must match.
    pub dimension: usize,
    /// Server-side batch cap.
    pub max_batch: usize,
    pub auth_header: Option<String>,
    pub provider: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8081/embed".into(),
            model: "qwen3-embedding".into(),
            dimension: 1024,
            max_batch: 64,
            auth_header: None,
            provider: "embedder".into(),
        }
    }
}

impl EmbedConfig {
    pub fn validate(&self) -> Result<(), VectorStoreError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(VectorStoreError::InvalidConfig("endpoint_url is empty".into()));
        }
        if self.dimension == 0 {
            return Err(VectorStoreError::InvalidConfig("dimension must be > 0".into()));
        }
        if self.max_batch == 0 {
            return Err(VectorStoreError::InvalidConfig("max_batch must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmbedClient {
    cfg: EmbedConfig,
}

impl EmbedClient {
    pub fn new(cfg: EmbedConfig) -> Result<Self, VectorStoreError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    /// Embed a batch of texts, splitting to the server's batch cap. Vector
    /// dimensionality is checked against the configured collection size.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let breaker = CIRCUIT_BREAKERS.get_or_create(&self.cfg.provider);
        if !breaker.allow_request() {
            return Err(VectorStoreError::CircuitOpen(self.cfg.provider.clone()));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.cfg.max_batch) {
            let payload = json!({"model": self.cfg.model, "input": chunk});
            let url = self.cfg.endpoint_url.clone();
            let auth = self.cfg.auth_header.clone();

            let outcome = run_with_retry(&BackoffPolicy::remote_call(), |attempt| {
                let url = url.clone();
                let auth = auth.clone();
                let payload = payload.clone();
                async move {
                    if attempt > 0 {
                        debug!(attempt, "retrying embed request");
                    }
                    send_request(&url, auth.as_deref(), payload).await
                }
            })
            .await;

            let value = match outcome.into_result() {
                Ok(value) => {
                    breaker.record_success();
                    value
                }
                Err(message) => {
                    breaker.record_failure();
                    return Err(VectorStoreError::Embed(message));
                }
            };

            let batch_vectors = parse_embeddings(value)?;
            if batch_vectors.len() != chunk.len() {
                return Err(VectorStoreError::Embed(format!(
                    "server returned {} embeddings for {} inputs",
                    batch_vectors.len(),
                    chunk.len()
                )));
            }
            for vector in &batch_vectors {
                if vector.len() != self.cfg.dimension {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected: self.cfg.dimension,
                        got: vector.len(),
                    });
                }
            }
            vectors.extend(batch_vectors);
        }
        metrics::counter!("tessera_embeddings_total").increment(texts.len() as u64);
        Ok(vectors)
    }

    /// Embed one query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorStoreError::Embed("server returned no embedding".into()))
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

fn parse_embeddings(value: Value) -> Result<Vec<Vec<f32>>, VectorStoreError> {
    if let Some(embeddings) = value.get("embeddings") {
        return parse_vector_array(embeddings);
    }
    if let Some(Value::Array(items)) = value.get("data") {
        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            let embedding = item
                .get("embedding")
                .ok_or_else(|| VectorStoreError::Embed("missing `embedding` in data item".into()))?;
            vectors.push(parse_vector(embedding)?);
        }
        return Ok(vectors);
    }
    Err(VectorStoreError::Embed("unsupported response shape".into()))
}

fn parse_vector_array(value: &Value) -> Result<Vec<Vec<f32>>, VectorStoreError> {
    let Value::Array(rows) = value else {
        return Err(VectorStoreError::Embed("embeddings is not an array".into()));
    };
    rows.iter().map(parse_vector).collect()
}

fn parse_vector(value: &Value) -> Result<Vec<f32>, VectorStoreError> {
    let Value::Array(entries) = value else {
        return Err(VectorStoreError::Embed("embedding is not an array".into()));
    };
    entries
        .iter()
        .map(|entry| {
            entry
                .as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| VectorStoreError::Embed("non-numeric embedding entry".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_embeddings_shape() {
        let value = json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]});
        let vectors = parse_embeddings(value).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2]);
    }

    #[test]
    fn parses_data_object_shape() {
        let value = json!({"data": [{"embedding": [1.0, 2.0, 3.0]}]});
        let vectors = parse_embeddings(value).unwrap();
        assert_eq!(vectors[0].len(), 3);
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(parse_embeddings(json!({"nope": 1})).is_err());
    }

    #[test]
    fn config_validation() {
        assert!(EmbedClient::new(EmbedConfig::default()).is_ok());
        let bad = EmbedConfig {
            dimension: 0,
            ..EmbedConfig::default()
        };
        assert!(EmbedClient::new(bad).is_err());
    }

    #[tokio::test]
    async fn empty_batch_is_free() {
        let client = EmbedClient::new(EmbedConfig::default()).unwrap();
        assert!(client.embed_batch(&[]).await.unwrap().is_empty());
    }
}
