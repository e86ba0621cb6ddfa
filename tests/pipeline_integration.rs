//! End-to-end tests over the pure pipeline stages: ingest, chunking, both
//! local extraction tiers, wire-format validation, and entity resolution.
//! Remote collaborators (graph store, vector store, model endpoints) are
//! exercised in their own crates' unit tests; nothing here needs a network.

use chrono::{TimeZone, Utc};

use tessera::deterministic::{self, DeterministicConfig};
use tessera::inference::WireExtraction;
use tessera::ingest::{
    accept_document, chunk_document, hash::content_hash, IngestConfig, NormalizedDocument,
    SourceType, SubStructure,
};
use tessera::linguistic::{self, CandidateWindow, LinguisticConfig};
use tessera::orchestrator::resolve_packets;
use tessera::schema::{PropValue, Tier};

fn document(doc_id: &str, source_type: SourceType, text: &str) -> NormalizedDocument {
    NormalizedDocument {
        doc_id: doc_id.into(),
        source_type,
        source_url: Some(format!("https://wiki.lan/{doc_id}")),
        ingested_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        content_hash: content_hash(text),
        text: text.into(),
        sub_structures: Vec::new(),
    }
}

#[test]
fn compose_ingest_produces_dependency_edge() {
    let compose = "services:\n  api:\n    image: api:2\n    depends_on: [db]\n  db:\n    image: postgres:16\n";
    let mut doc = document("compose-1", SourceType::DockerCompose, "");
    doc.sub_structures.push(SubStructure {
        language: Some("yaml".into()),
        text: compose.into(),
        span: (0, compose.len()),
    });
    let doc = accept_document(doc, &IngestConfig::default()).unwrap();

    let tier_a = deterministic::extract(&doc, &DeterministicConfig::default()).unwrap();
    let resolved = resolve_packets(vec![tier_a.packet]);

    let dep = resolved
        .edges
        .iter()
        .find(|e| e.type_tag == "DEPENDS_ON")
        .expect("compose dependency extracted");
    assert_eq!(dep.src.uid(), "Service:api");
    assert_eq!(dep.dst.uid(), "Service:db");
    assert_eq!(dep.tier, Tier::A);
    assert_eq!(dep.confidence, 1.0);

    assert!(resolved.nodes.iter().any(|n| n.node_ref().uid() == "Service:api"));
    assert!(resolved.nodes.iter().any(|n| n.node_ref().uid() == "Service:db"));
}

#[test]
fn prose_dependency_mined_across_tiers() {
    let doc = accept_document(
        document(
            "prose-1",
            SourceType::Web,
            "The nginx service at 10.0.0.1 depends on postgres for caching.",
        ),
        &IngestConfig::default(),
    )
    .unwrap();

    let tier_a = deterministic::extract(&doc, &DeterministicConfig::default()).unwrap();
    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    let resolved = resolve_packets(vec![tier_a.packet, tier_b.packet]);

    let uids: Vec<String> = resolved.nodes.iter().map(|n| n.node_ref().uid()).collect();
    assert!(uids.contains(&"Service:nginx".to_string()));
    assert!(uids.contains(&"IpAddress:10.0.0.1".to_string()));
    assert!(uids.contains(&"Service:postgres".to_string()));

    let edges: Vec<(String, String, String)> = resolved
        .edges
        .iter()
        .map(|e| (e.type_tag.clone(), e.src.uid(), e.dst.uid()))
        .collect();
    assert!(edges.contains(&(
        "BINDS".into(),
        "Service:nginx".into(),
        "IpAddress:10.0.0.1".into()
    )));
    assert!(edges.contains(&(
        "DEPENDS_ON".into(),
        "Service:nginx".into(),
        "Service:postgres".into()
    )));
}

#[test]
fn ambiguous_prose_selects_window_and_wire_output_validates() {
    let doc = accept_document(
        document(
            "prose-2",
            SourceType::Web,
            "Traefik routes traffic to the backend API running on api.internal:8080.",
        ),
        &IngestConfig::default(),
    )
    .unwrap();

    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    assert_eq!(tier_b.windows.len(), 1, "window selected for deep extraction");
    let window = &tier_b.windows[0];
    assert!(window.text.contains("api.internal:8080"));

    // The structured extractor's expected reply for that window.
    let model_reply = r#"{
        "entities": [
            {"type": "ReverseProxy", "name": "traefik", "props": {}},
            {"type": "Service", "name": "backend-api", "props": {"port": 8080}},
            {"type": "Host", "name": "api.internal", "props": {}}
        ],
        "relations": [
            {"type": "ROUTES_TO", "src": "traefik", "dst": "backend-api",
             "props": {"host": "api.internal", "port": 8080}}
        ],
        "confidence": 0.9
    }"#;
    let packet = WireExtraction::from_model_output(model_reply)
        .unwrap()
        .into_packet(&doc.doc_id, window, "3.0.1", 0.9, doc.ingested_at);

    let resolved = resolve_packets(vec![packet]);
    let route = resolved
        .edges
        .iter()
        .find(|e| e.type_tag == "ROUTES_TO")
        .expect("route extracted");
    assert_eq!(route.src.uid(), "ReverseProxy:traefik");
    assert_eq!(route.dst.uid(), "Service:backend-api");
    assert_eq!(route.props.get("host"), Some(&PropValue::Str("api.internal".into())));
    assert_eq!(route.props.get("port"), Some(&PropValue::Int(8080)));
    assert_eq!(route.tier, Tier::C);
    assert!(route.confidence >= 0.80);
}

#[test]
fn version_bump_changes_edge_identity() {
    let doc = accept_document(
        document("prose-3", SourceType::Web, "grafana depends on prometheus."),
        &IngestConfig::default(),
    )
    .unwrap();

    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    let edge = tier_b
        .packet
        .edges
        .iter()
        .find(|e| e.type_tag == "DEPENDS_ON")
        .expect("dependency mined");

    let mut bumped = edge.clone();
    bumped.extractor_version = "999.0.0".into();
    // The writer upserts by composite key: a version bump supersedes rather
    // than duplicates.
    assert_ne!(edge.composite_key(), bumped.composite_key());
    assert_eq!(edge.src, bumped.src);
    assert_eq!(edge.dst, bumped.dst);
}

#[test]
fn empty_document_completes_with_nothing_but_the_document_node() {
    let mut doc = document("empty-1", SourceType::Web, "");
    doc.sub_structures.push(SubStructure {
        language: None,
        text: String::new(),
        span: (0, 0),
    });
    let doc = accept_document(doc, &IngestConfig::default()).unwrap();

    assert!(chunk_document(&doc, &IngestConfig::default()).is_empty());

    let tier_a = deterministic::extract(&doc, &DeterministicConfig::default()).unwrap();
    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    assert!(tier_b.windows.is_empty());

    let resolved = resolve_packets(vec![tier_a.packet, tier_b.packet]);
    assert_eq!(resolved.nodes.len(), 1);
    assert_eq!(resolved.nodes[0].type_tag, "Document");
    assert!(resolved.edges.is_empty());
}

#[test]
fn code_only_document_needs_no_language_tiers() {
    let compose = "services:\n  web:\n    image: nginx:1.27\n    ports: [\"443:443\"]\n";
    let mut doc = document("code-only", SourceType::DockerCompose, "");
    doc.sub_structures.push(SubStructure {
        language: Some("yaml".into()),
        text: compose.into(),
        span: (0, compose.len()),
    });
    let doc = accept_document(doc, &IngestConfig::default()).unwrap();

    let tier_a = deterministic::extract(&doc, &DeterministicConfig::default()).unwrap();
    assert!(tier_a.packet.edges.iter().any(|e| e.type_tag == "EXPOSES"));

    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    assert!(tier_b.packet.edges.is_empty());
    assert!(tier_b.windows.is_empty());
}

#[test]
fn long_document_chunks_to_ceiling() {
    let sentences: Vec<String> = (0..2000)
        .map(|i| format!("Sentence number {i} talks about service{i}."))
        .collect();
    let text = sentences.join(" ");
    let doc = accept_document(
        document("long-1", SourceType::Web, &text),
        &IngestConfig::default(),
    )
    .unwrap();

    let chunks = chunk_document(&doc, &IngestConfig::default());
    let words = text.split_whitespace().count();
    assert_eq!(chunks.len(), words.div_ceil(512));
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal as usize, i);
    }
}

#[test]
fn window_budget_is_respected_on_dense_documents() {
    let text: Vec<String> = (0..100)
        .map(|i| format!("service{i} nginx depends on postgres at 10.0.0.{} today.", i % 250 + 1))
        .collect();
    let doc = accept_document(
        document("dense-1", SourceType::Web, &text.join(" ")),
        &IngestConfig::default(),
    )
    .unwrap();

    let tier_b = linguistic::extract(&doc, &LinguisticConfig::default());
    assert!(tier_b.windows.len() <= 16);
    for window in &tier_b.windows {
        let tokens: usize = window.text.split_whitespace().count();
        assert!(tokens <= 512);
    }
}

#[test]
fn windows_convert_to_packets_with_provenance() {
    let window = CandidateWindow {
        ordinal: 3,
        text: "caddy forwards to jellyfin".into(),
        score: 8.0,
        sentence_range: (6, 8),
        token_span: (120, 160),
    };
    let reply = r#"{"entities":[{"type":"Service","name":"caddy","props":{}},
        {"type":"Service","name":"jellyfin","props":{}}],
        "relations":[{"type":"ROUTES_TO","src":"caddy","dst":"jellyfin","props":{}}]}"#;
    let packet = WireExtraction::from_model_output(reply)
        .unwrap()
        .into_packet("doc-p", &window, "3.0.1", 0.88, Utc::now());

    assert_eq!(packet.provenance.len(), 1);
    assert_eq!(packet.provenance[0].doc_id, "doc-p");
    assert_eq!(packet.provenance[0].window_ordinal, Some(3));
    assert_eq!(packet.provenance[0].token_span, Some((120, 160)));
}
