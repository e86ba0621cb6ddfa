//! Static type catalog.
//!
//! One registry per process, assembled at startup. Every node type declares
//! its natural-key fields up front; registration without a key is rejected,
//! as is a duplicate tag. Components never mint tags themselves, they look
//! descriptors up here.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::SchemaError;
use crate::tags::{edge, node};

/// Semver stamp propagated onto every written node and edge. Bump on any
/// change to the catalog below; the extraction cache invalidates on mismatch.
pub const SCHEMA_VERSION: &str = "1.2.0";

/// Value kinds a property may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Str,
    Int,
    Float,
    Bool,
    Timestamp,
    StrList,
}

/// Descriptor for one node type.
#[derive(Debug, Clone)]
pub struct NodeTypeDescriptor {
    pub type_tag: &'static str,
    /// Ordered fields whose values uniquely identify a node of this type.
    pub natural_key: &'static [&'static str],
    pub properties: &'static [(&'static str, PropKind)],
    pub confidence_threshold: f64,
}

/// Descriptor for one edge type. The universal header fields are implicit;
/// only typed extras are listed.
#[derive(Debug, Clone)]
pub struct EdgeTypeDescriptor {
    pub type_tag: &'static str,
    pub properties: &'static [(&'static str, PropKind)],
    pub confidence_threshold: f64,
}

/// Process-wide catalog of node and edge types.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    node_types: HashMap<&'static str, NodeTypeDescriptor>,
    edge_types: HashMap<&'static str, EdgeTypeDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node(&mut self, descriptor: NodeTypeDescriptor) -> Result<(), SchemaError> {
        if descriptor.natural_key.is_empty() {
            return Err(SchemaError::MissingNaturalKey(descriptor.type_tag.into()));
        }
        if self.node_types.contains_key(descriptor.type_tag) {
            return Err(SchemaError::DuplicateTag(descriptor.type_tag.into()));
        }
        self.node_types.insert(descriptor.type_tag, descriptor);
        Ok(())
    }

    pub fn register_edge(&mut self, descriptor: EdgeTypeDescriptor) -> Result<(), SchemaError> {
        if self.edge_types.contains_key(descriptor.type_tag) {
            return Err(SchemaError::DuplicateTag(descriptor.type_tag.into()));
        }
        self.edge_types.insert(descriptor.type_tag, descriptor);
        Ok(())
    }

    pub fn get_node_type(&self, tag: &str) -> Option<&NodeTypeDescriptor> {
        self.node_types.get(tag)
    }

    pub fn get_edge_type(&self, tag: &str) -> Option<&EdgeTypeDescriptor> {
        self.edge_types.get(tag)
    }

    pub fn all_node_types(&self) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.node_types.values()
    }

    pub fn all_edge_types(&self) -> impl Iterator<Item = &EdgeTypeDescriptor> {
        self.edge_types.values()
    }

    /// Acceptance threshold for an edge type, falling back to the pipeline
    /// default when the tag is unknown.
    pub fn edge_threshold(&self, tag: &str) -> f64 {
        self.edge_types
            .get(tag)
            .map(|d| d.confidence_threshold)
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn schema_version(&self) -> &'static str {
        SCHEMA_VERSION
    }
}

/// Default acceptance threshold applied when a type declares no override.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

macro_rules! props {
    ($(($name:literal, $kind:ident)),* $(,)?) => {
        &[$(($name, PropKind::$kind)),*]
    };
}

fn builtin_catalog() -> SchemaRegistry {
    let mut reg = SchemaRegistry::new();

    let node_types = [
        NodeTypeDescriptor {
            type_tag: node::PERSON,
            natural_key: &["name"],
            properties: props![("name", Str), ("email", Str), ("aliases", StrList)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::ORGANIZATION,
            natural_key: &["name"],
            properties: props![("name", Str), ("domain", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::PLACE,
            natural_key: &["name"],
            properties: props![("name", Str), ("country", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::EVENT,
            natural_key: &["name", "occurred_at"],
            properties: props![("name", Str), ("occurred_at", Timestamp)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::FILE,
            natural_key: &["path"],
            properties: props![("path", Str), ("size_bytes", Int), ("mime_type", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::DOCUMENT,
            natural_key: &["doc_id"],
            properties: props![
                ("doc_id", Str),
                ("source_type", Str),
                ("source_url", Str),
                ("content_hash", Str),
                ("ingested_at", Timestamp),
                ("extraction_state", Str),
            ],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::SERVICE,
            natural_key: &["name"],
            properties: props![("name", Str), ("image", Str), ("port", Int), ("protocol", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::CONTAINER,
            natural_key: &["name"],
            properties: props![("name", Str), ("image", Str), ("restart", Str), ("env", StrList)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::COMPOSE_NETWORK,
            natural_key: &["name"],
            properties: props![("name", Str), ("driver", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::VOLUME,
            natural_key: &["name"],
            properties: props![("name", Str), ("mountpoint", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::REVERSE_PROXY,
            natural_key: &["name"],
            properties: props![("name", Str), ("kind", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::ROUTE,
            natural_key: &["proxy", "rule"],
            properties: props![("proxy", Str), ("rule", Str), ("entrypoints", StrList)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::UPSTREAM,
            natural_key: &["address"],
            properties: props![("address", Str), ("port", Int)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::HOST,
            natural_key: &["fqdn"],
            properties: props![("fqdn", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::IP_ADDRESS,
            natural_key: &["address"],
            properties: props![("address", Str), ("version", Int)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::REPOSITORY,
            natural_key: &["full_name"],
            properties: props![("full_name", Str), ("default_branch", Str), ("topics", StrList)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::ISSUE,
            natural_key: &["repository", "number"],
            properties: props![("repository", Str), ("number", Int), ("title", Str), ("state", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::COMMIT,
            natural_key: &["sha"],
            properties: props![("sha", Str), ("message", Str), ("authored_at", Timestamp)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::EMAIL_MESSAGE,
            natural_key: &["message_id"],
            properties: props![("message_id", Str), ("subject", Str), ("sent_at", Timestamp)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::MAIL_THREAD,
            natural_key: &["thread_id"],
            properties: props![("thread_id", Str), ("subject", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::MAIL_LABEL,
            natural_key: &["name"],
            properties: props![("name", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::DEVICE,
            natural_key: &["name"],
            properties: props![("name", Str), ("model", Str), ("mac", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::NET_INTERFACE,
            natural_key: &["device", "name"],
            properties: props![("device", Str), ("name", Str), ("mtu", Int)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::VLAN,
            natural_key: &["vid"],
            properties: props![("vid", Int), ("name", Str)],
            confidence_threshold: 0.70,
        },
        NodeTypeDescriptor {
            type_tag: node::FIREWALL_RULE,
            natural_key: &["device", "rule_id"],
            properties: props![("device", Str), ("rule_id", Str), ("action", Str), ("enabled", Bool)],
            confidence_threshold: 0.70,
        },
    ];

    let edge_types = [
        EdgeTypeDescriptor {
            type_tag: edge::DEPENDS_ON,
            properties: props![("condition", Str)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::ROUTES_TO,
            properties: props![("host", Str), ("port", Int), ("path_prefix", Str)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::BINDS,
            properties: props![("port", Int), ("protocol", Str)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::RUNS,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::MENTIONS,
            properties: props![("count", Int)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::EXPOSES,
            properties: props![("port", Int), ("protocol", Str)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::CONNECTS_TO,
            properties: props![("port", Int)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::MOUNTS,
            properties: props![("target", Str), ("read_only", Bool)],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::ATTACHED_TO,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::PROXIES,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::MEMBER_OF,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::LOCATED_IN,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::AUTHORED,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::REFERENCES,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::BELONGS_TO,
            properties: props![],
            confidence_threshold: 0.70,
        },
        EdgeTypeDescriptor {
            type_tag: edge::TAGGED,
            properties: props![],
            confidence_threshold: 0.70,
        },
    ];

    for descriptor in node_types {
        // The catalog is hand-written; a duplicate here is a programming
        // error, surfaced at first registry access.
        if let Err(err) = reg.register_node(descriptor) {
            panic!("invalid builtin node catalog: {err}");
        }
    }
    for descriptor in edge_types {
        if let Err(err) = reg.register_edge(descriptor) {
            panic!("invalid builtin edge catalog: {err}");
        }
    }

    reg
}

static REGISTRY: Lazy<SchemaRegistry> = Lazy::new(builtin_catalog);

/// The process-wide registry.
pub fn registry() -> &'static SchemaRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tag_rejected() {
        let mut reg = SchemaRegistry::new();
        let descriptor = NodeTypeDescriptor {
            type_tag: "Widget",
            natural_key: &["name"],
            properties: props![("name", Str)],
            confidence_threshold: 0.70,
        };
        reg.register_node(descriptor.clone()).unwrap();
        let err = reg.register_node(descriptor).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTag(_)));
    }

    #[test]
    fn keyless_node_rejected() {
        let mut reg = SchemaRegistry::new();
        let err = reg
            .register_node(NodeTypeDescriptor {
                type_tag: "Keyless",
                natural_key: &[],
                properties: props![],
                confidence_threshold: 0.70,
            })
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingNaturalKey(_)));
    }

    #[test]
    fn threshold_falls_back_to_default() {
        let reg = registry();
        assert_eq!(reg.edge_threshold("DEPENDS_ON"), 0.70);
        assert_eq!(reg.edge_threshold("UNKNOWN"), DEFAULT_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn builtin_catalog_has_composite_keys() {
        let reg = registry();
        let issue = reg.get_node_type("Issue").unwrap();
        assert_eq!(issue.natural_key, &["repository", "number"]);
    }
}
