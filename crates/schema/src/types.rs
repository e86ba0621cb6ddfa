//! Value model shared by every pipeline stage.
//!
//! Nodes are identified by `(type_tag, natural_key)` and edges by the
//! composite `(type_tag, src, dst, source_doc_id, extractor_version)` so that
//! re-extracting a document upserts its contribution instead of duplicating
//! it. No pointer graph exists in application memory; records are plain
//! values keyed for the store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extraction tier that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        }
    }

    /// Tier precedence for scalar property reconciliation: A beats B beats C.
    pub fn precedence(&self) -> u8 {
        match self {
            Tier::A => 3,
            Tier::B => 2,
            Tier::C => 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed property value carried on nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    StrList(Vec<String>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Lists are unioned during entity resolution; everything else is scalar.
    pub fn is_list(&self) -> bool {
        matches!(self, PropValue::StrList(_))
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Reference to a node by type tag and natural-key values (in the order the
/// registry declares the key fields).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub type_tag: String,
    pub natural_key: Vec<String>,
}

impl NodeRef {
    pub fn new(type_tag: impl Into<String>, natural_key: Vec<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            natural_key,
        }
    }

    /// Stable string identity, also written as the `uid` property on every
    /// stored node so traversal can address nodes without knowing labels.
    pub fn uid(&self) -> String {
        let mut out = String::with_capacity(16 + self.type_tag.len());
        out.push_str(&self.type_tag);
        for part in &self.natural_key {
            out.push(':');
            out.push_str(part);
        }
        out
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uid())
    }
}

/// A tagged node produced by an extractor or by entity resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub type_tag: String,
    /// Natural-key values, ordered per the registry descriptor.
    pub natural_key: Vec<String>,
    pub props: BTreeMap<String, PropValue>,
    pub tier: Tier,
    pub confidence: f64,
}

impl NodeRecord {
    pub fn new(
        type_tag: impl Into<String>,
        natural_key: Vec<String>,
        tier: Tier,
        confidence: f64,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            natural_key,
            props: BTreeMap::new(),
            tier,
            confidence,
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            type_tag: self.type_tag.clone(),
            natural_key: self.natural_key.clone(),
        }
    }
}

/// A typed edge carrying the universal header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub type_tag: String,
    pub src: NodeRef,
    pub dst: NodeRef,
    pub source_doc_id: String,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub extractor_version: String,
    pub tier: Tier,
    pub props: BTreeMap<String, PropValue>,
}

impl EdgeRecord {
    pub fn new(
        type_tag: impl Into<String>,
        src: NodeRef,
        dst: NodeRef,
        source_doc_id: impl Into<String>,
        extractor_version: impl Into<String>,
        tier: Tier,
        confidence: f64,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            src,
            dst,
            source_doc_id: source_doc_id.into(),
            source_timestamp: None,
            confidence,
            extractor_version: extractor_version.into(),
            tier,
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(ts);
        self
    }

    /// Identity under which the writer upserts: two extractions of the same
    /// document at the same extractor version collapse to one stored edge.
    pub fn composite_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.type_tag,
            self.src.uid(),
            self.dst.uid(),
            self.source_doc_id,
            self.extractor_version
        )
    }
}

/// Where a triple came from inside its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub doc_id: String,
    pub window_ordinal: Option<u32>,
    pub token_span: Option<(usize, usize)>,
}

impl Provenance {
    pub fn document(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            window_ordinal: None,
            token_span: None,
        }
    }

    pub fn window(doc_id: impl Into<String>, ordinal: u32, span: (usize, usize)) -> Self {
        Self {
            doc_id: doc_id.into(),
            window_ordinal: Some(ordinal),
            token_span: Some(span),
        }
    }
}

/// The unit of graph output from one extractor pass over one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriplePacket {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub provenance: Vec<Provenance>,
}

impl TriplePacket {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn push_node(&mut self, node: NodeRecord) {
        self.nodes.push(node);
    }

    pub fn push_edge(&mut self, edge: EdgeRecord) {
        self.edges.push(edge);
    }

    /// Fold another packet into this one. Deduplication happens later, at
    /// entity resolution; here we only concatenate.
    pub fn absorb(&mut self, other: TriplePacket) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.provenance.extend(other.provenance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_uid_is_stable() {
        let r = NodeRef::new("Service", vec!["nginx".into()]);
        assert_eq!(r.uid(), "Service:nginx");

        let multi = NodeRef::new("Route", vec!["traefik".into(), "api".into()]);
        assert_eq!(multi.uid(), "Route:traefik:api");
    }

    #[test]
    fn edge_composite_key_includes_version() {
        let src = NodeRef::new("Service", vec!["api".into()]);
        let dst = NodeRef::new("Service", vec!["db".into()]);
        let edge_v1 = EdgeRecord::new("DEPENDS_ON", src.clone(), dst.clone(), "doc-1", "2.0.0", Tier::A, 1.0);
        let edge_v2 = EdgeRecord::new("DEPENDS_ON", src, dst, "doc-1", "2.1.0", Tier::A, 1.0);
        assert_ne!(edge_v1.composite_key(), edge_v2.composite_key());
    }

    #[test]
    fn tier_precedence_orders_a_over_c() {
        assert!(Tier::A.precedence() > Tier::B.precedence());
        assert!(Tier::B.precedence() > Tier::C.precedence());
    }

    #[test]
    fn packet_absorb_concatenates() {
        let mut a = TriplePacket::default();
        a.push_node(NodeRecord::new("Service", vec!["api".into()], Tier::A, 1.0));

        let mut b = TriplePacket::default();
        b.push_node(NodeRecord::new("Service", vec!["db".into()], Tier::B, 0.85));
        b.provenance.push(Provenance::document("doc-1"));

        a.absorb(b);
        assert_eq!(a.nodes.len(), 2);
        assert_eq!(a.provenance.len(), 1);
    }

    #[test]
    fn prop_value_serde_roundtrip() {
        let values = vec![
            PropValue::Str("nginx".into()),
            PropValue::Int(8080),
            PropValue::Bool(true),
            PropValue::StrList(vec!["a".into(), "b".into()]),
        ];
        for v in values {
            let json = serde_json::to_string(&v).unwrap();
            let back: PropValue = serde_json::from_str(&json).unwrap();
            assert_eq!(v, back);
        }
    }
}
