//! Tessera Tier A Extraction
//!
//! Deterministic extraction: structured config shapes, a fixed known-entity
//! vocabulary, and high-precision lexical patterns. No statistical inference
//! happens here; everything this tier emits carries `confidence = 1.0`.
//!
//! ## Pipeline
//!
//! 1. Embedded blocks (reader-preserved sub-structures plus fenced blocks
//!    found in the text) go through the shape matchers in [`compose`]:
//!    Docker-Compose service graphs and reverse-proxy dynamic configs.
//! 2. The plain text is scanned with the Aho-Corasick [`lexicon`] (linear in
//!    document length regardless of vocabulary size) and the validated
//!    lexical [`patterns`] (IPs, CIDRs, host:port, URLs, FQDNs).
//! 3. Every recognized entity becomes a node plus a `MENTIONS` edge from the
//!    owning `Document` node.
//!
//! Malformed blocks are skipped with a recorded warning; the document is not
//! failed. Only an unrecoverable condition returns [`DeterministicError`].

use std::collections::BTreeMap;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use ingest::NormalizedDocument;
use schema::tags::{edge, node};
use schema::{EdgeRecord, NodeRecord, NodeRef, Provenance, Tier, TriplePacket};

pub mod compose;
mod error;
pub mod lexicon;
pub mod patterns;

pub use compose::BlockOutcome;
pub use error::DeterministicError;

/// Version stamped on every Tier A edge; bump when extraction logic changes
/// so reprocessing supersedes earlier contributions.
pub const EXTRACTOR_VERSION: &str = "2.1.0";

/// Warning recorded for an embedded block that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWarning {
    pub block_index: usize,
    pub language: Option<String>,
    pub message: String,
}

/// Tier A output: the triple packet plus per-block warnings.
#[derive(Debug, Clone, Default)]
pub struct TierAOutput {
    pub packet: TriplePacket,
    pub warnings: Vec<BlockWarning>,
}

/// Configuration for Tier A extraction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DeterministicConfig {
    /// Also look for fenced ``` blocks inside the plain text, not just
    /// reader-preserved sub-structures.
    pub scan_fenced_blocks: bool,
    /// Cap on MENTIONS edges per document, largest counts kept.
    pub max_mentions: usize,
}

impl Default for DeterministicConfig {
    fn default() -> Self {
        Self {
            scan_fenced_blocks: true,
            max_mentions: 256,
        }
    }
}

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([a-zA-Z0-9_-]*)\n(.*?)```").expect("fence regex")
});

/// Run Tier A over one document.
pub fn extract(
    doc: &NormalizedDocument,
    cfg: &DeterministicConfig,
) -> Result<TierAOutput, DeterministicError> {
    let start = Instant::now();
    let mut out = TierAOutput::default();
    let doc_ref = NodeRef::new(node::DOCUMENT, vec![doc.doc_id.clone()]);

    out.packet.push_node(document_node(doc));
    out.packet.provenance.push(Provenance::document(&doc.doc_id));

    // Structured blocks first: reader-preserved, then fenced spans in text.
    let mut blocks: Vec<(Option<String>, String)> = doc
        .sub_structures
        .iter()
        .map(|s| (s.language.clone(), s.text.clone()))
        .collect();
    if cfg.scan_fenced_blocks {
        for cap in FENCED_BLOCK.captures_iter(&doc.text) {
            let lang = cap.get(1).map(|m| m.as_str()).filter(|s| !s.is_empty());
            if let Some(body) = cap.get(2) {
                blocks.push((lang.map(String::from), body.as_str().to_string()));
            }
        }
    }

    for (index, (language, raw)) in blocks.iter().enumerate() {
        match compose::extract_block(&doc.doc_id, language.as_deref(), raw) {
            BlockOutcome::Extracted(packet) => out.packet.absorb(packet),
            BlockOutcome::Unrecognized => {
                debug!(doc_id = %doc.doc_id, block = index, "block matched no known shape");
            }
            BlockOutcome::Malformed(message) => {
                warn!(doc_id = %doc.doc_id, block = index, %message, "skipping malformed block");
                out.warnings.push(BlockWarning {
                    block_index: index,
                    language: language.clone(),
                    message,
                });
            }
        }
    }

    // Lexical passes over the plain text.
    let mut mention_counts: BTreeMap<NodeRef, i64> = BTreeMap::new();

    for hit in lexicon::scan(&doc.text) {
        let node_ref = NodeRef::new(hit.type_tag, vec![hit.canonical.to_string()]);
        if mention_counts.get(&node_ref).is_none() {
            out.packet.push_node(
                NodeRecord::new(hit.type_tag, vec![hit.canonical.to_string()], Tier::A, 1.0)
                    .with_prop("name", hit.canonical),
            );
        }
        *mention_counts.entry(node_ref).or_insert(0) += 1;
    }

    for hit in patterns::scan(&doc.text) {
        match hit.kind {
            patterns::PatternKind::Ipv4 { address } => {
                let r = NodeRef::new(node::IP_ADDRESS, vec![address.clone()]);
                if mention_counts.get(&r).is_none() {
                    out.packet.push_node(
                        NodeRecord::new(node::IP_ADDRESS, vec![address.clone()], Tier::A, 1.0)
                            .with_prop("address", address)
                            .with_prop("version", 4i64),
                    );
                }
                *mention_counts.entry(r).or_insert(0) += 1;
            }
            patterns::PatternKind::Cidr { network, mask } => {
                let key = format!("{network}/{mask}");
                let r = NodeRef::new(node::IP_ADDRESS, vec![key.clone()]);
                if mention_counts.get(&r).is_none() {
                    out.packet.push_node(
                        NodeRecord::new(node::IP_ADDRESS, vec![key.clone()], Tier::A, 1.0)
                            .with_prop("address", key)
                            .with_prop("version", 4i64),
                    );
                }
                *mention_counts.entry(r).or_insert(0) += 1;
            }
            patterns::PatternKind::HostPort { host, port } => {
                let address = format!("{host}:{port}");
                let r = NodeRef::new(node::UPSTREAM, vec![address.clone()]);
                if mention_counts.get(&r).is_none() {
                    out.packet.push_node(
                        NodeRecord::new(node::UPSTREAM, vec![address.clone()], Tier::A, 1.0)
                            .with_prop("address", address)
                            .with_prop("port", i64::from(port)),
                    );
                }
                *mention_counts.entry(r).or_insert(0) += 1;
            }
            patterns::PatternKind::Fqdn { name } => {
                let r = NodeRef::new(node::HOST, vec![name.clone()]);
                if mention_counts.get(&r).is_none() {
                    out.packet.push_node(
                        NodeRecord::new(node::HOST, vec![name.clone()], Tier::A, 1.0)
                            .with_prop("fqdn", name),
                    );
                }
                *mention_counts.entry(r).or_insert(0) += 1;
            }
            patterns::PatternKind::Url { .. } => {
                // URLs identify sources, not graph entities.
            }
        }
    }

    let mut mentions: Vec<(NodeRef, i64)> = mention_counts.into_iter().collect();
    mentions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    mentions.truncate(cfg.max_mentions);
    for (target, count) in mentions {
        out.packet.push_edge(
            EdgeRecord::new(
                edge::MENTIONS,
                doc_ref.clone(),
                target,
                &doc.doc_id,
                EXTRACTOR_VERSION,
                Tier::A,
                1.0,
            )
            .with_prop("count", count)
            .with_timestamp(doc.ingested_at),
        );
    }

    info!(
        doc_id = %doc.doc_id,
        nodes = out.packet.nodes.len(),
        edges = out.packet.edges.len(),
        warnings = out.warnings.len(),
        elapsed_micros = start.elapsed().as_micros() as u64,
        "tier_a_extracted"
    );
    Ok(out)
}

fn document_node(doc: &NormalizedDocument) -> NodeRecord {
    let mut n = NodeRecord::new(node::DOCUMENT, vec![doc.doc_id.clone()], Tier::A, 1.0)
        .with_prop("doc_id", doc.doc_id.as_str())
        .with_prop("source_type", doc.source_type.as_str())
        .with_prop("content_hash", doc.content_hash.as_str());
    n.props.insert(
        "ingested_at".into(),
        schema::PropValue::Timestamp(doc.ingested_at),
    );
    if let Some(url) = &doc.source_url {
        n = n.with_prop("source_url", url.as_str());
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ingest::{hash::content_hash, SourceType, SubStructure};

    fn doc_with(text: &str, subs: Vec<SubStructure>) -> NormalizedDocument {
        NormalizedDocument {
            doc_id: "doc-a".into(),
            source_type: SourceType::Web,
            source_url: None,
            ingested_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            content_hash: content_hash(text),
            text: text.into(),
            sub_structures: subs,
        }
    }

    #[test]
    fn compose_substructure_produces_dependency() {
        let compose = "services:\n  api:\n    depends_on: [db]\n  db:\n    image: postgres\n";
        let doc = doc_with(
            "",
            vec![SubStructure {
                language: Some("yaml".into()),
                text: compose.into(),
                span: (0, compose.len()),
            }],
        );
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();
        let dep = out
            .packet
            .edges
            .iter()
            .find(|e| e.type_tag == "DEPENDS_ON")
            .expect("dependency extracted");
        assert_eq!(dep.src.uid(), "Service:api");
        assert_eq!(dep.dst.uid(), "Service:db");
        assert_eq!(dep.confidence, 1.0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn fenced_block_in_text_is_parsed() {
        let text = "Here is my stack:\n```yaml\nservices:\n  web:\n    depends_on: [cache]\n```\ndone";
        let doc = doc_with(text, Vec::new());
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();
        assert!(out.packet.edges.iter().any(|e| e.type_tag == "DEPENDS_ON"));
    }

    #[test]
    fn prose_entities_become_mentions() {
        let doc = doc_with("The nginx service at 10.0.0.1 depends on postgres.", Vec::new());
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();

        let mentions: Vec<&EdgeRecord> = out
            .packet
            .edges
            .iter()
            .filter(|e| e.type_tag == "MENTIONS")
            .collect();
        let targets: Vec<String> = mentions.iter().map(|e| e.dst.uid()).collect();
        assert!(targets.contains(&"Service:nginx".to_string()));
        assert!(targets.contains(&"Service:postgres".to_string()));
        assert!(targets.contains(&"IpAddress:10.0.0.1".to_string()));
        for m in mentions {
            assert_eq!(m.src.uid(), "Document:doc-a");
        }
    }

    #[test]
    fn malformed_block_recorded_not_fatal() {
        let doc = doc_with(
            "text",
            vec![SubStructure {
                language: Some("yaml".into()),
                text: "services:\n  - [broken".into(),
                span: (0, 10),
            }],
        );
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].block_index, 0);
    }

    #[test]
    fn empty_document_yields_document_node_only() {
        let doc = doc_with("", Vec::new());
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();
        assert_eq!(out.packet.nodes.len(), 1);
        assert_eq!(out.packet.nodes[0].type_tag, "Document");
        assert!(out.packet.edges.is_empty());
    }

    #[test]
    fn repeated_mentions_are_counted_once_per_entity() {
        let doc = doc_with("redis redis redis and more redis", Vec::new());
        let out = extract(&doc, &DeterministicConfig::default()).unwrap();
        let mentions: Vec<&EdgeRecord> = out
            .packet
            .edges
            .iter()
            .filter(|e| e.type_tag == "MENTIONS")
            .collect();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].props.get("count"), Some(&schema::PropValue::Int(4)));
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "traefik routes to api.internal:8080 on 192.168.1.0/24";
        let a = extract(&doc_with(text, Vec::new()), &DeterministicConfig::default()).unwrap();
        let b = extract(&doc_with(text, Vec::new()), &DeterministicConfig::default()).unwrap();
        assert_eq!(a.packet.nodes, b.packet.nodes);
        assert_eq!(a.packet.edges.len(), b.packet.edges.len());
    }
}
