//! Grounded answer synthesis.
//!
//! The context block is the reranked chunks, each prefixed with its numeric
//! citation key, followed by a compact serialization of the graph
//! neighborhood. The model is instructed to answer only from that context
//! and to cite every factual sentence. An empty bundle short-circuits to
//! the deterministic "insufficient evidence" answer; nothing is ever
//! synthesized from thin air.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use inference::{ChatMessage, LlmClient};

use crate::error::RetrievalError;
use crate::types::{RetrievalBundle, SynthesizedAnswer};

/// The fixed reply for queries the corpus cannot support.
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient evidence";

const SYNTH_SYSTEM_PROMPT: &str = "You answer questions about infrastructure using only the \
provided context. Every sentence that asserts a fact must cite its source(s) as [n] using \
the bracketed keys from the context. If the context does not answer the question, reply \
exactly: insufficient evidence";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerConfig {
    /// Cap on context characters sent to the model.
    pub max_context_chars: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 24_000,
        }
    }
}

pub struct Synthesizer {
    llm: LlmClient,
    cfg: SynthesizerConfig,
}

impl Synthesizer {
    pub fn new(llm: LlmClient, cfg: SynthesizerConfig) -> Self {
        Self { llm, cfg }
    }

    /// Answer `question` from the bundle. The returned latency breakdown is
    /// the bundle's with the synthesis stage filled in.
    #[instrument(skip(self, bundle))]
    pub async fn answer(
        &self,
        question: &str,
        bundle: &RetrievalBundle,
    ) -> Result<SynthesizedAnswer, RetrievalError> {
        let mut latency = bundle.query_latency_breakdown;

        if bundle.is_empty() {
            return Ok(SynthesizedAnswer {
                answer: INSUFFICIENT_EVIDENCE.to_string(),
                sources: Vec::new(),
                latency_breakdown: latency,
            });
        }

        let context = self.build_context(bundle);
        let messages = vec![
            ChatMessage::system(SYNTH_SYSTEM_PROMPT),
            ChatMessage::user(format!("Context:\n{context}\n\nQuestion: {question}")),
        ];

        let started = Instant::now();
        let outcome = self
            .llm
            .chat(&messages, None)
            .await
            .map_err(|e| RetrievalError::Synthesis(e.to_string()))?;
        latency.synthesis_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("tessera_query_synthesis_ms").record(latency.synthesis_ms as f64);

        let answer = outcome.content.trim().to_string();
        let sources = cited_sources(&answer, bundle);

        info!(
            answer_chars = answer.len(),
            sources = sources.len(),
            total_ms = latency.total_ms(),
            "synthesis complete"
        );
        Ok(SynthesizedAnswer {
            answer,
            sources,
            latency_breakdown: latency,
        })
    }

    /// `[n] <source>: <text>` per chunk, then the subgraph rendering.
    fn build_context(&self, bundle: &RetrievalBundle) -> String {
        let mut context = String::new();
        for (index, chunk) in bundle.ordered_chunks.iter().enumerate() {
            let line = format!(
                "[{}] ({} {}#{}) {}\n",
                index + 1,
                chunk.source_type,
                chunk.doc_id,
                chunk.ordinal,
                chunk.text
            );
            if context.len() + line.len() > self.cfg.max_context_chars {
                break;
            }
            context.push_str(&line);
        }
        if !bundle.graph_subgraph.is_empty() {
            let graph_block = format!(
                "\nKnown relationships:\n{}\n",
                bundle.graph_subgraph.render_compact()
            );
            if context.len() + graph_block.len() <= self.cfg.max_context_chars {
                context.push_str(&graph_block);
            }
        }
        context
    }
}

/// Map the citation keys the answer actually used back to their documents.
fn cited_sources(answer: &str, bundle: &RetrievalBundle) -> Vec<(usize, String)> {
    let mut sources = Vec::new();
    for (index, chunk) in bundle.ordered_chunks.iter().enumerate() {
        let key = format!("[{}]", index + 1);
        if answer.contains(&key) {
            sources.push((index + 1, chunk.doc_id.clone()));
        }
    }
    sources
}
