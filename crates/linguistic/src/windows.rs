//! Candidate-window selection for the downstream structured extractor.
//!
//! Sentences are scored for extraction value (entity density, relation verbs,
//! numeric/technical tokens, a length sweet spot) and the best ones are
//! packaged as windows of the sentence plus one sentence of context either
//! side. Selection is greedy under the constraint that no two windows share a
//! sentence, and a window never exceeds the token budget.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::relations::verb_tag;
use crate::tagger::TaggedEntity;
use crate::token::{PosTag, Sentence};

/// A span of sentences selected for deeper extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateWindow {
    /// Position among this document's windows, assigned in score order.
    pub ordinal: u32,
    pub text: String,
    pub score: f64,
    /// Inclusive sentence index range the window covers.
    pub sentence_range: (usize, usize),
    /// Word-token span within the owning document.
    pub token_span: (usize, usize),
}

/// Scoring and selection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub max_windows: usize,
    pub min_score: f64,
    pub max_window_tokens: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_windows: 16,
            min_score: 3.0,
            max_window_tokens: 512,
        }
    }
}

/// Score one sentence for Tier C candidacy.
pub fn score_sentence(sentence: &Sentence, entities: &[TaggedEntity]) -> f64 {
    let entity_count = entities.iter().filter(|e| e.sent_index == sentence.index).count();
    let verb_count = sentence
        .tokens
        .iter()
        .filter(|t| verb_tag(&t.lower).is_some())
        .count();
    let numeric_count = sentence
        .tokens
        .iter()
        .filter(|t| t.pos == PosTag::Number)
        .count();
    let len = sentence.token_count();
    let length_bonus = if (8..=64).contains(&len) { 1.0 } else { 0.0 };

    2.0 * entity_count as f64 + 3.0 * verb_count as f64 + 0.5 * numeric_count as f64 + length_bonus
}

/// Select windows from scored sentences. `token_offsets[i]` is the word-token
/// offset of sentence `i` within the document.
pub fn select_windows(
    sentences: &[Sentence],
    scores: &[f64],
    cfg: &WindowConfig,
) -> Vec<CandidateWindow> {
    debug_assert_eq!(sentences.len(), scores.len());

    let mut order: Vec<usize> = (0..sentences.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let token_offsets = token_offsets(sentences);
    let mut used: HashSet<usize> = HashSet::new();
    let mut windows = Vec::new();

    for center in order {
        if windows.len() >= cfg.max_windows {
            break;
        }
        if scores[center] < cfg.min_score || used.contains(&center) {
            continue;
        }

        // Context sentences join only if free and within budget.
        let mut lo = center;
        let mut hi = center;
        let mut tokens = sentences[center].token_count();
        if center > 0 && !used.contains(&(center - 1)) {
            let extra = sentences[center - 1].token_count();
            if tokens + extra <= cfg.max_window_tokens {
                lo = center - 1;
                tokens += extra;
            }
        }
        if center + 1 < sentences.len() && !used.contains(&(center + 1)) {
            let extra = sentences[center + 1].token_count();
            if tokens + extra <= cfg.max_window_tokens {
                hi = center + 1;
                tokens += extra;
            }
        }
        if tokens > cfg.max_window_tokens {
            // A single pathological sentence can blow the budget on its own;
            // skip it rather than truncate mid-entity.
            continue;
        }

        for i in lo..=hi {
            used.insert(i);
        }

        let text = sentences[lo..=hi]
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        windows.push(CandidateWindow {
            ordinal: windows.len() as u32,
            text,
            score: scores[center],
            sentence_range: (lo, hi),
            token_span: (token_offsets[lo], token_offsets[hi] + sentences[hi].token_count()),
        });
    }

    windows
}

fn token_offsets(sentences: &[Sentence]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(sentences.len());
    let mut acc = 0usize;
    for s in sentences {
        offsets.push(acc);
        acc += s.token_count();
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::tag_sentence;
    use crate::token::split_sentences;

    fn windows_for(text: &str, cfg: &WindowConfig) -> Vec<CandidateWindow> {
        let sentences = split_sentences(text);
        let scores: Vec<f64> = sentences
            .iter()
            .map(|s| score_sentence(s, &tag_sentence(s)))
            .collect();
        select_windows(&sentences, &scores, cfg)
    }

    #[test]
    fn rich_sentence_outscores_filler() {
        let sentences = split_sentences(
            "The nginx service at 10.0.0.1 depends on postgres. The weather is nice.",
        );
        let rich = score_sentence(&sentences[0], &tag_sentence(&sentences[0]));
        let filler = score_sentence(&sentences[1], &tag_sentence(&sentences[1]));
        assert!(rich > filler);
    }

    #[test]
    fn windows_do_not_share_sentences() {
        let text = "traefik routes grafana to port 443. \
                    nginx depends on postgres heavily today. \
                    redis connects to sentinel on 6379. \
                    prometheus exposes metrics on 9090 for grafana.";
        let windows = windows_for(text, &WindowConfig::default());
        let mut seen = HashSet::new();
        for w in &windows {
            for i in w.sentence_range.0..=w.sentence_range.1 {
                assert!(seen.insert(i), "sentence {i} appears in two windows");
            }
        }
        assert!(!windows.is_empty());
    }

    #[test]
    fn low_scoring_text_yields_no_windows() {
        let windows = windows_for("Hello there. Nice day. Bye.", &WindowConfig::default());
        assert!(windows.is_empty());
    }

    #[test]
    fn max_windows_respected() {
        let text = (0..20)
            .map(|i| format!("service{i} nginx depends on postgres via port {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let cfg = WindowConfig {
            max_windows: 4,
            ..WindowConfig::default()
        };
        let windows = windows_for(&text, &cfg);
        assert!(windows.len() <= 4);
    }

    #[test]
    fn ordinals_are_sequential() {
        let text = "nginx depends on postgres at 10.0.0.1. \
                    traefik routes grafana to api.internal:8080. \
                    redis connects to sentinel on 6379.";
        let windows = windows_for(text, &WindowConfig::default());
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.ordinal as usize, i);
        }
    }
}
