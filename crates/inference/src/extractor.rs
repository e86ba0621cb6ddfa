//! Tier C driver: batches candidate windows through the endpoint, applies
//! the acceptance policy, and keeps the cache and dead-letter queue honest.
//!
//! Acceptance policy per window:
//! - confidence >= 0.80: accept as-is
//! - 0.70 <= confidence < 0.80: one re-extraction with the strict prompt,
//!   the second score is final
//! - below 0.70: drop the window's output
//!
//! Malformed JSON is re-queued once; the second malformed response sends the
//! window to the dead-letter queue under `E_LLM_FORMAT`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use linguistic::CandidateWindow;
use schema::{TriplePacket, SCHEMA_VERSION};
use staging::{cache_key, DeadLetterQueue, ExtractionCache, FailureCause, UnitKind};

use crate::client::{ChatOutcome, LlmClient};
use crate::error::InferenceError;
use crate::parse::WireExtraction;
use crate::prompt::extraction_messages;

/// Version stamped on every Tier C edge.
pub const EXTRACTOR_VERSION: &str = "3.0.1";

/// Fallback confidence when neither logprobs nor a model self-score exist.
const DEFAULT_MODEL_SCORE: f64 = 0.85;

/// Knobs for the Tier C driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCConfig {
    /// Windows per request batch. Boundaries cross documents upstream; the
    /// driver only sees a flat window list.
    pub batch_size: usize,
    pub accept_threshold: f64,
    pub reextract_threshold: f64,
    /// Per-window wall clock.
    pub window_timeout_secs: u64,
}

impl Default for TierCConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            accept_threshold: 0.80,
            reextract_threshold: 0.70,
            window_timeout_secs: 30,
        }
    }
}

/// Outcome counters for one document's Tier C pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierCReport {
    pub windows_total: usize,
    pub cache_hits: usize,
    pub llm_calls: usize,
    pub accepted: usize,
    pub reextracted: usize,
    pub dropped_low_confidence: usize,
    pub format_failures: usize,
    pub dead_lettered: usize,
}

/// Tier C output: merged packet plus the pass report.
#[derive(Debug, Clone, Default)]
pub struct TierCOutput {
    pub packet: TriplePacket,
    pub report: TierCReport,
}

/// Payload cached per window: the validated wire document and its final
/// confidence, serialized once so cache hits are byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedExtraction {
    wire: WireExtraction,
    confidence: f64,
}

pub struct TierCExtractor {
    client: LlmClient,
    cache: Arc<ExtractionCache>,
    dlq: Arc<DeadLetterQueue>,
    cfg: TierCConfig,
}

impl TierCExtractor {
    pub fn new(
        client: LlmClient,
        cache: Arc<ExtractionCache>,
        dlq: Arc<DeadLetterQueue>,
        cfg: TierCConfig,
    ) -> Self {
        Self {
            client,
            cache,
            dlq,
            cfg,
        }
    }

    fn version_stamp() -> String {
        format!("{EXTRACTOR_VERSION}|{SCHEMA_VERSION}")
    }

    /// Process every window of one document. Window-level failures are
    /// dead-lettered, not propagated; the packet carries whatever succeeded.
    pub async fn extract_windows(
        &self,
        doc_id: &str,
        windows: &[CandidateWindow],
        source_timestamp: DateTime<Utc>,
    ) -> TierCOutput {
        let mut output = TierCOutput {
            report: TierCReport {
                windows_total: windows.len(),
                ..TierCReport::default()
            },
            ..TierCOutput::default()
        };

        for batch in windows.chunks(self.cfg.batch_size.max(1)) {
            let results = join_all(
                batch
                    .iter()
                    .map(|window| self.extract_one(doc_id, window, source_timestamp)),
            )
            .await;

            for (window, result) in batch.iter().zip(results) {
                match result {
                    WindowResult::Accepted {
                        packet,
                        cache_hit,
                        llm_calls,
                        reextracted,
                    } => {
                        output.report.accepted += 1;
                        output.report.llm_calls += llm_calls;
                        if cache_hit {
                            output.report.cache_hits += 1;
                        }
                        if reextracted {
                            output.report.reextracted += 1;
                        }
                        output.packet.absorb(packet);
                    }
                    WindowResult::DroppedLowConfidence { llm_calls } => {
                        output.report.llm_calls += llm_calls;
                        output.report.dropped_low_confidence += 1;
                    }
                    WindowResult::Failed {
                        cause,
                        llm_calls,
                        format_failures,
                    } => {
                        output.report.llm_calls += llm_calls;
                        output.report.format_failures += format_failures;
                        output.report.dead_lettered += 1;
                        let key = window_key(doc_id, window);
                        for _ in 0..format_failures.max(1) {
                            self.dlq.push(&key, &window.text, UnitKind::Window, cause);
                        }
                    }
                }
            }
        }

        info!(
            doc_id,
            windows = output.report.windows_total,
            accepted = output.report.accepted,
            cache_hits = output.report.cache_hits,
            llm_calls = output.report.llm_calls,
            dead_lettered = output.report.dead_lettered,
            "tier_c_extracted"
        );
        output
    }

    async fn extract_one(
        &self,
        doc_id: &str,
        window: &CandidateWindow,
        source_timestamp: DateTime<Utc>,
    ) -> WindowResult {
        let key = cache_key(&window.text, EXTRACTOR_VERSION, SCHEMA_VERSION);
        let stamp = Self::version_stamp();

        if let Some(payload) = self.cache.get(&key, &stamp) {
            if let Ok(cached) = serde_json::from_str::<CachedExtraction>(&payload) {
                debug!(doc_id, ordinal = window.ordinal, "tier_c_cache_hit");
                let packet = cached.wire.into_packet(
                    doc_id,
                    window,
                    EXTRACTOR_VERSION,
                    cached.confidence,
                    source_timestamp,
                );
                return WindowResult::Accepted {
                    packet,
                    cache_hit: true,
                    llm_calls: 0,
                    reextracted: false,
                };
            }
            // A cache entry that no longer deserializes is just a miss.
            warn!(doc_id, ordinal = window.ordinal, "evicting undecodable cache entry");
        }

        let mut llm_calls = 0usize;
        let mut format_failures = 0usize;

        // First pass, plus at most one format retry.
        let (wire, confidence) = loop {
            llm_calls += 1;
            match self.call_window(window, false).await {
                Ok((wire, confidence)) => break (wire, confidence),
                Err(InferenceError::MalformedOutput(message)) => {
                    format_failures += 1;
                    metrics::counter!("tessera_llm_format_failures_total").increment(1);
                    warn!(doc_id, ordinal = window.ordinal, %message, "malformed model output");
                    if format_failures >= 2 {
                        return WindowResult::Failed {
                            cause: FailureCause::LlmFormat,
                            llm_calls,
                            format_failures,
                        };
                    }
                }
                Err(InferenceError::Timeout(secs)) => {
                    warn!(doc_id, ordinal = window.ordinal, secs, "window timed out");
                    return WindowResult::Failed {
                        cause: FailureCause::Timeout,
                        llm_calls,
                        format_failures,
                    };
                }
                Err(err) => {
                    warn!(doc_id, ordinal = window.ordinal, error = %err, "window extraction failed");
                    return WindowResult::Failed {
                        cause: FailureCause::Internal,
                        llm_calls,
                        format_failures,
                    };
                }
            }
        };

        // Acceptance policy.
        let (wire, confidence, reextracted) = if confidence >= self.cfg.accept_threshold {
            (wire, confidence, false)
        } else if confidence >= self.cfg.reextract_threshold {
            llm_calls += 1;
            match self.call_window(window, true).await {
                // Second score is final, whatever it is.
                Ok((strict_wire, strict_confidence)) => (strict_wire, strict_confidence, true),
                Err(_) => (wire, confidence, true),
            }
        } else {
            debug!(doc_id, ordinal = window.ordinal, confidence, "dropping low-confidence window");
            return WindowResult::DroppedLowConfidence { llm_calls };
        };

        if confidence < self.cfg.reextract_threshold {
            return WindowResult::DroppedLowConfidence { llm_calls };
        }

        let cached = CachedExtraction {
            wire: wire.clone(),
            confidence,
        };
        if let Ok(serialized) = serde_json::to_string(&cached) {
            self.cache.put(key, serialized, stamp);
        }

        let packet = wire.into_packet(
            doc_id,
            window,
            EXTRACTOR_VERSION,
            confidence,
            source_timestamp,
        );
        WindowResult::Accepted {
            packet,
            cache_hit: false,
            llm_calls,
            reextracted,
        }
    }

    async fn call_window(
        &self,
        window: &CandidateWindow,
        strict: bool,
    ) -> Result<(WireExtraction, f64), InferenceError> {
        let messages = extraction_messages(&window.text, strict);
        let budget = Duration::from_secs(self.cfg.window_timeout_secs);

        let outcome: ChatOutcome = timeout(budget, self.client.chat(&messages, None))
            .await
            .map_err(|_| InferenceError::Timeout(self.cfg.window_timeout_secs))??;

        let wire = WireExtraction::from_model_output(&outcome.content)?;
        let confidence = outcome
            .logprob_confidence
            .or(wire.confidence)
            .unwrap_or(DEFAULT_MODEL_SCORE)
            .clamp(0.0, 1.0);
        Ok((wire, confidence))
    }
}

enum WindowResult {
    Accepted {
        packet: TriplePacket,
        cache_hit: bool,
        llm_calls: usize,
        reextracted: bool,
    },
    DroppedLowConfidence {
        llm_calls: usize,
    },
    Failed {
        cause: FailureCause,
        llm_calls: usize,
        format_failures: usize,
    },
}

fn window_key(doc_id: &str, window: &CandidateWindow) -> String {
    format!("{doc_id}#w{}", window.ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_stamp_combines_both_versions() {
        let stamp = TierCExtractor::version_stamp();
        assert!(stamp.contains(EXTRACTOR_VERSION));
        assert!(stamp.contains(SCHEMA_VERSION));
    }

    #[test]
    fn cached_extraction_roundtrip_is_byte_stable() {
        let cached = CachedExtraction {
            wire: WireExtraction {
                entities: Vec::new(),
                relations: Vec::new(),
                confidence: Some(0.9),
            },
            confidence: 0.9,
        };
        let a = serde_json::to_string(&cached).unwrap();
        let b = serde_json::to_string(&serde_json::from_str::<CachedExtraction>(&a).unwrap())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn window_keys_distinguish_ordinals() {
        let w0 = CandidateWindow {
            ordinal: 0,
            text: "a".into(),
            score: 1.0,
            sentence_range: (0, 0),
            token_span: (0, 1),
        };
        let w1 = CandidateWindow { ordinal: 1, ..w0.clone() };
        assert_ne!(window_key("doc", &w0), window_key("doc", &w1));
    }
}
