//! Chat-completion endpoint client.
//!
//! One pooled HTTP client for the process, a circuit breaker per provider,
//! and bounded retry around each call. Requests are greedy (temperature 0)
//! and ask for JSON mode when the endpoint supports it. Both the
//! OpenAI-style (`choices[0].message.content`) and bare (`message.content`)
//! response layouts are accepted.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use staging::{BackoffPolicy, CircuitBreakerRegistry, run_with_retry};

use crate::error::InferenceError;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .expect("inference HTTP client builds")
});

static CIRCUIT_BREAKERS: Lazy<CircuitBreakerRegistry> =
    Lazy::new(CircuitBreakerRegistry::default);

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Model response plus a log-probability-derived confidence when the
/// endpoint reports token logprobs.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub logprob_confidence: Option<f64>,
}

/// Endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint_url: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Forwarded as `options.batch_hint` so a batching server can pack
    /// concurrent requests.
    pub batch_hint: u32,
    /// Ask the endpoint for a single JSON document response.
    pub json_mode: bool,
    pub auth_header: Option<String>,
    /// Name used for circuit-breaker and metrics labels.
    pub provider: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:11434/api/chat".into(),
            model: "qwen2.5:14b-instruct".into(),
            temperature: 0.0,
            top_p: 1.0,
            batch_hint: 16,
            json_mode: true,
            auth_header: None,
            provider: "llm".into(),
        }
    }
}

impl LlmConfig {
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(InferenceError::InvalidConfig("endpoint_url is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(InferenceError::InvalidConfig("model is empty".into()));
        }
        Ok(())
    }
}

/// Thin client over one chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, InferenceError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn provider(&self) -> &str {
        &self.cfg.provider
    }

    /// Issue one chat request. Retries transient failures on the shared
    /// ladder and honors the provider's circuit breaker.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        stop: Option<&[&str]>,
    ) -> Result<ChatOutcome, InferenceError> {
        let breaker = CIRCUIT_BREAKERS.get_or_create(&self.cfg.provider);
        if !breaker.allow_request() {
            return Err(InferenceError::CircuitOpen(self.cfg.provider.clone()));
        }

        let payload = self.build_payload(messages, stop);
        let url = self.cfg.endpoint_url.clone();
        let auth = self.cfg.auth_header.clone();

        let outcome = run_with_retry(&BackoffPolicy::remote_call(), |attempt| {
            let url = url.clone();
            let auth = auth.clone();
            let payload = payload.clone();
            async move {
                if attempt > 0 {
                    debug!(attempt, "retrying chat completion");
                }
                send_request(&url, auth.as_deref(), payload).await
            }
        })
        .await;

        match outcome.into_result() {
            Ok(value) => {
                breaker.record_success();
                parse_response(value)
            }
            Err(message) => {
                breaker.record_failure();
                Err(InferenceError::Http(message))
            }
        }
    }

    fn build_payload(&self, messages: &[ChatMessage], stop: Option<&[&str]>) -> Value {
        let mut payload = json!({
            "model": self.cfg.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.cfg.temperature,
                "top_p": self.cfg.top_p,
                "batch_hint": self.cfg.batch_hint,
            },
        });
        if self.cfg.json_mode {
            payload["format"] = json!("json");
        }
        if let Some(stop) = stop {
            payload["stop"] = json!(stop);
        }
        payload
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

fn parse_response(value: Value) -> Result<ChatOutcome, InferenceError> {
    // OpenAI layout.
    if let Some(choice) = value.get("choices").and_then(|c| c.get(0)) {
        let content = choice
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                InferenceError::Http("response choice carried no message content".into())
            })?
            .to_string();
        let logprob_confidence = aggregate_logprobs(choice.pointer("/logprobs/content"));
        return Ok(ChatOutcome {
            content,
            logprob_confidence,
        });
    }
    // Bare chat layout (`message.content`).
    if let Some(content) = value.pointer("/message/content").and_then(Value::as_str) {
        return Ok(ChatOutcome {
            content: content.to_string(),
            logprob_confidence: aggregate_logprobs(value.get("logprobs")),
        });
    }
    Err(InferenceError::Http(format!(
        "unsupported response shape: {}",
        truncate(&value.to_string(), 160)
    )))
}

/// Mean token logprob, exponentiated back to a [0,1] confidence.
fn aggregate_logprobs(entries: Option<&Value>) -> Option<f64> {
    let entries = entries?.as_array()?;
    if entries.is_empty() {
        return None;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for entry in entries {
        let lp = entry
            .get("logprob")
            .and_then(Value::as_f64)
            .or_else(|| entry.as_f64())?;
        sum += lp;
        count += 1;
    }
    Some((sum / count as f64).exp().clamp(0.0, 1.0))
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_options_and_format() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        let payload = client.build_payload(
            &[ChatMessage::system("sys"), ChatMessage::user("hello")],
            Some(&["\n\n"]),
        );
        assert_eq!(payload["model"], "qwen2.5:14b-instruct");
        assert_eq!(payload["options"]["temperature"], 0.0);
        assert_eq!(payload["options"]["batch_hint"], 16);
        assert_eq!(payload["format"], "json");
        assert_eq!(payload["stop"][0], "\n\n");
        assert_eq!(payload["messages"][1]["role"], "user");
    }

    #[test]
    fn openai_shape_parses() {
        let value = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"entities\":[]}"},
                "logprobs": {"content": [{"logprob": -0.1}, {"logprob": -0.3}]}
            }]
        });
        let outcome = parse_response(value).unwrap();
        assert_eq!(outcome.content, "{\"entities\":[]}");
        let conf = outcome.logprob_confidence.unwrap();
        assert!((conf - (-0.2f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn bare_shape_parses() {
        let value = json!({"message": {"role": "assistant", "content": "{}"}});
        let outcome = parse_response(value).unwrap();
        assert_eq!(outcome.content, "{}");
        assert!(outcome.logprob_confidence.is_none());
    }

    #[test]
    fn unknown_shape_rejected() {
        assert!(parse_response(json!({"surprise": true})).is_err());
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = LlmConfig {
            model: "".into(),
            ..LlmConfig::default()
        };
        assert!(LlmClient::new(cfg).is_err());
    }
}
