//! Tessera Tier B Extraction
//!
//! Linguistic extraction over plain prose: a deterministic tokenizer with
//! lightweight token attributes, a rule-based entity tagger, a verb-frame
//! relation matcher, and the scorer that selects candidate windows for the
//! downstream structured extractor.
//!
//! Everything in this crate is pure computation. The same input text always
//! produces the same entities, relations, and windows; that is a requirement, since
//! window text participates in extraction cache keys.
//!
//! Relations mined here carry `confidence = 0.85`; they read well-formed
//! grammar, not ground truth. Structured config blocks never reach this tier,
//! they are consumed upstream.

use std::time::Instant;

use tracing::info;

use ingest::NormalizedDocument;
use schema::tags::node;
use schema::{EdgeRecord, NodeRecord, NodeRef, Provenance, Tier, TriplePacket};

pub mod relations;
pub mod tagger;
pub mod token;
pub mod windows;

pub use relations::MinedRelation;
pub use tagger::TaggedEntity;
pub use windows::{CandidateWindow, WindowConfig};

/// Version stamped on every Tier B edge.
pub const EXTRACTOR_VERSION: &str = "1.4.0";

/// Default confidence for linguistically mined relations.
pub const DEFAULT_CONFIDENCE: f64 = 0.85;

/// Configuration for Tier B extraction.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LinguisticConfig {
    pub windows: WindowConfig,
}

/// Tier B output: mined triples plus scored candidate windows.
#[derive(Debug, Clone, Default)]
pub struct TierBOutput {
    pub packet: TriplePacket,
    pub windows: Vec<CandidateWindow>,
    pub sentence_count: usize,
}

/// Run Tier B over one document.
pub fn extract(doc: &NormalizedDocument, cfg: &LinguisticConfig) -> TierBOutput {
    let start = Instant::now();
    let sentences = token::split_sentences(&doc.text);

    let mut packet = TriplePacket::default();
    let mut scores = Vec::with_capacity(sentences.len());

    for sentence in &sentences {
        let entities = tagger::tag_sentence(sentence);
        scores.push(windows::score_sentence(sentence, &entities));

        for entity in &entities {
            packet.push_node(entity_node(entity));
        }
        for relation in relations::mine(sentence, &entities) {
            packet.push_edge(
                EdgeRecord::new(
                    relation.edge_tag,
                    entity_ref(&relation.subject),
                    entity_ref(&relation.object),
                    &doc.doc_id,
                    EXTRACTOR_VERSION,
                    Tier::B,
                    DEFAULT_CONFIDENCE,
                )
                .with_timestamp(doc.ingested_at),
            );
            packet
                .provenance
                .push(Provenance::document(&doc.doc_id));
        }
    }

    let windows = windows::select_windows(&sentences, &scores, &cfg.windows);

    info!(
        doc_id = %doc.doc_id,
        sentences = sentences.len(),
        nodes = packet.nodes.len(),
        edges = packet.edges.len(),
        windows = windows.len(),
        elapsed_micros = start.elapsed().as_micros() as u64,
        "tier_b_extracted"
    );

    TierBOutput {
        packet,
        windows,
        sentence_count: sentences.len(),
    }
}

fn entity_ref(entity: &TaggedEntity) -> NodeRef {
    NodeRef::new(entity.type_tag, vec![entity.canonical.clone()])
}

fn entity_node(entity: &TaggedEntity) -> NodeRecord {
    let key_field = match entity.type_tag {
        t if t == node::HOST => "fqdn",
        t if t == node::IP_ADDRESS || t == node::UPSTREAM => "address",
        _ => "name",
    };
    NodeRecord::new(
        entity.type_tag,
        vec![entity.canonical.clone()],
        Tier::B,
        DEFAULT_CONFIDENCE,
    )
    .with_prop(key_field, entity.canonical.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ingest::{hash::content_hash, SourceType};

    fn doc(text: &str) -> NormalizedDocument {
        NormalizedDocument {
            doc_id: "doc-b".into(),
            source_type: SourceType::Web,
            source_url: None,
            ingested_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            content_hash: content_hash(text),
            text: text.into(),
            sub_structures: Vec::new(),
        }
    }

    #[test]
    fn prose_dependency_is_mined() {
        let out = extract(
            &doc("The nginx service at 10.0.0.1 depends on postgres for caching."),
            &LinguisticConfig::default(),
        );

        let edges: Vec<(&str, String, String)> = out
            .packet
            .edges
            .iter()
            .map(|e| (e.type_tag.as_str(), e.src.uid(), e.dst.uid()))
            .collect();
        assert!(edges.contains(&(
            "BINDS",
            "Service:nginx".into(),
            "IpAddress:10.0.0.1".into()
        )));
        assert!(edges.contains(&(
            "DEPENDS_ON",
            "Service:nginx".into(),
            "Service:postgres".into()
        )));
        for e in &out.packet.edges {
            assert_eq!(e.tier, Tier::B);
            assert_eq!(e.confidence, DEFAULT_CONFIDENCE);
        }
    }

    #[test]
    fn empty_document_is_empty_output() {
        let out = extract(&doc(""), &LinguisticConfig::default());
        assert!(out.packet.is_empty());
        assert!(out.windows.is_empty());
        assert_eq!(out.sentence_count, 0);
    }

    #[test]
    fn output_is_deterministic() {
        let text = "traefik routes traffic to the backend API running on api.internal:8080. \
                    The backend depends on postgres.";
        let a = extract(&doc(text), &LinguisticConfig::default());
        let b = extract(&doc(text), &LinguisticConfig::default());
        assert_eq!(a.packet, b.packet);
        assert_eq!(a.windows, b.windows);
    }

    #[test]
    fn windows_selected_for_rich_prose() {
        let out = extract(
            &doc("Traefik routes traffic to the backend API running on api.internal:8080."),
            &LinguisticConfig::default(),
        );
        assert_eq!(out.windows.len(), 1);
        assert!(out.windows[0].text.contains("api.internal:8080"));
    }
}
