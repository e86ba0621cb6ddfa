//! Wire-format validation for model output.
//!
//! The model must return one JSON document in the fixed shape. Unknown type
//! tags, self-referential relations, and references to undeclared entities
//! are dropped with a warning; structurally invalid JSON is a malformed
//! output and counts against the window's format budget.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use linguistic::CandidateWindow;
use schema::{registry, EdgeRecord, NodeRecord, NodeRef, PropValue, Provenance, Tier, TriplePacket};

use crate::error::InferenceError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEntity {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub name: String,
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireRelation {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

/// The single JSON document the extractor demands from the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireExtraction {
    #[serde(default)]
    pub entities: Vec<WireEntity>,
    #[serde(default)]
    pub relations: Vec<WireRelation>,
    /// Model self-assessment, used when the endpoint reports no logprobs.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl WireExtraction {
    /// Parse and structurally validate one model response.
    pub fn from_model_output(content: &str) -> Result<Self, InferenceError> {
        let trimmed = strip_fences(content);
        let wire: WireExtraction = serde_json::from_str(trimmed)
            .map_err(|e| InferenceError::MalformedOutput(e.to_string()))?;
        Ok(wire)
    }

    /// Convert into a triple packet, dropping records the registry rejects.
    pub fn into_packet(
        self,
        doc_id: &str,
        window: &CandidateWindow,
        extractor_version: &str,
        confidence: f64,
        source_timestamp: DateTime<Utc>,
    ) -> TriplePacket {
        let reg = registry();
        let mut packet = TriplePacket::default();
        let mut declared: BTreeMap<String, NodeRef> = BTreeMap::new();

        for entity in self.entities {
            if reg.get_node_type(&entity.type_tag).is_none() {
                warn!(tag = %entity.type_tag, "dropping entity with unknown type tag");
                continue;
            }
            let name = entity.name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            let node_ref = NodeRef::new(entity.type_tag.clone(), vec![name.clone()]);
            let mut node =
                NodeRecord::new(entity.type_tag.clone(), vec![name.clone()], Tier::C, confidence);
            let key_field = reg
                .get_node_type(&entity.type_tag)
                .and_then(|d| d.natural_key.first().copied())
                .unwrap_or("name");
            node = node.with_prop(key_field, name.clone());
            for (prop, value) in entity.props {
                if let Some(prop_value) = prop_value_of(&value) {
                    node.props.insert(prop, prop_value);
                }
            }
            declared.insert(entity.name.trim().to_lowercase(), node_ref);
            packet.push_node(node);
        }

        for relation in self.relations {
            if reg.get_edge_type(&relation.type_tag).is_none() {
                warn!(tag = %relation.type_tag, "dropping relation with unknown type tag");
                continue;
            }
            let src_key = relation.src.trim().to_lowercase();
            let dst_key = relation.dst.trim().to_lowercase();
            let (Some(src), Some(dst)) = (declared.get(&src_key), declared.get(&dst_key)) else {
                warn!(
                    tag = %relation.type_tag,
                    src = %relation.src,
                    dst = %relation.dst,
                    "dropping relation referencing undeclared entity"
                );
                continue;
            };
            if src == dst {
                continue;
            }
            let mut edge = EdgeRecord::new(
                relation.type_tag.clone(),
                src.clone(),
                dst.clone(),
                doc_id,
                extractor_version,
                Tier::C,
                confidence,
            )
            .with_timestamp(source_timestamp);
            for (prop, value) in relation.props {
                if let Some(prop_value) = prop_value_of(&value) {
                    edge.props.insert(prop, prop_value);
                }
            }
            packet.push_edge(edge);
        }

        packet.provenance.push(Provenance::window(
            doc_id,
            window.ordinal,
            window.token_span,
        ));
        packet
    }
}

fn prop_value_of(value: &Value) -> Option<PropValue> {
    match value {
        Value::String(s) => Some(PropValue::Str(s.clone())),
        Value::Bool(b) => Some(PropValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(PropValue::Int(i))
            } else {
                n.as_f64().map(PropValue::Float)
            }
        }
        Value::Array(items) => {
            let strings: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
            (!strings.is_empty()).then_some(PropValue::StrList(strings))
        }
        _ => None,
    }
}

/// Models occasionally wrap JSON in markdown fences despite instructions.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> CandidateWindow {
        CandidateWindow {
            ordinal: 0,
            text: "Traefik routes traffic to the backend API on api.internal:8080.".into(),
            score: 9.0,
            sentence_range: (0, 0),
            token_span: (0, 11),
        }
    }

    fn ts() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn valid_output_becomes_packet() {
        let content = r#"{
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
        let wire = WireExtraction::from_model_output(content).unwrap();
        assert_eq!(wire.confidence, Some(0.9));

        let packet = wire.into_packet("doc-1", &window(), "3.0.1", 0.9, ts());
        assert_eq!(packet.nodes.len(), 3);
        assert_eq!(packet.edges.len(), 1);
        let edge = &packet.edges[0];
        assert_eq!(edge.type_tag, "ROUTES_TO");
        assert_eq!(edge.src.uid(), "ReverseProxy:traefik");
        assert_eq!(edge.dst.uid(), "Service:backend-api");
        assert_eq!(edge.props.get("port"), Some(&PropValue::Int(8080)));
        assert_eq!(edge.tier, Tier::C);
        assert_eq!(packet.provenance[0].window_ordinal, Some(0));
    }

    #[test]
    fn fenced_output_is_tolerated() {
        let content = "```json\n{\"entities\":[],\"relations\":[]}\n```";
        assert!(WireExtraction::from_model_output(content).is_ok());
    }

    #[test]
    fn non_json_is_malformed() {
        let err = WireExtraction::from_model_output("I think the answer is nginx").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedOutput(_)));
    }

    #[test]
    fn unknown_tags_are_dropped_not_fatal() {
        let content = r#"{
            "entities": [
                {"type": "Spaceship", "name": "rocinante", "props": {}},
                {"type": "Service", "name": "nginx", "props": {}}
            ],
            "relations": [
                {"type": "FLIES_TO", "src": "rocinante", "dst": "nginx", "props": {}}
            ]
        }"#;
        let packet = WireExtraction::from_model_output(content)
            .unwrap()
            .into_packet("doc-1", &window(), "3.0.1", 0.85, ts());
        assert_eq!(packet.nodes.len(), 1);
        assert!(packet.edges.is_empty());
    }

    #[test]
    fn relation_to_undeclared_entity_dropped() {
        let content = r#"{
            "entities": [{"type": "Service", "name": "nginx", "props": {}}],
            "relations": [{"type": "DEPENDS_ON", "src": "nginx", "dst": "ghost", "props": {}}]
        }"#;
        let packet = WireExtraction::from_model_output(content)
            .unwrap()
            .into_packet("doc-1", &window(), "3.0.1", 0.85, ts());
        assert!(packet.edges.is_empty());
    }

    #[test]
    fn entity_names_are_canonicalized_lowercase() {
        let content = r#"{
            "entities": [{"type": "Service", "name": "  NGINX ", "props": {}}],
            "relations": []
        }"#;
        let packet = WireExtraction::from_model_output(content)
            .unwrap()
            .into_packet("doc-1", &window(), "3.0.1", 0.85, ts());
        assert_eq!(packet.nodes[0].natural_key, vec!["nginx".to_string()]);
    }
}
