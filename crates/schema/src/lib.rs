//! Tessera Schema Layer
//!
//! The single process-wide catalog of node and edge types plus the value
//! model that every other stage produces and consumes. Extractors emit
//! [`TriplePacket`]s of tagged [`NodeRecord`]s and [`EdgeRecord`]s; the graph
//! writer dispatches on the tag through the [`SchemaRegistry`] to find the
//! natural-key fields and property contracts for each type.
//!
//! ## What lives here
//!
//! - **Type descriptors** - every node type records its `type_tag`, ordered
//!   natural-key fields, property list with value kinds, and a confidence
//!   threshold; every edge type records its typed props on top of the
//!   universal edge header.
//! - **The value model** - [`PropValue`], [`NodeRecord`], [`EdgeRecord`],
//!   [`NodeRef`], [`Provenance`], and [`TriplePacket`].
//! - **Version stamps** - [`SCHEMA_VERSION`] is propagated onto every written
//!   node and edge and participates in extraction cache keys.
//!
//! Registration is static: the built-in catalog is assembled once behind a
//! `Lazy` and the registry rejects duplicate tags and key-less node types.
//!
//! ## Example
//!
//! ```
//! use schema::{registry, NodeRecord, Tier};
//!
//! let reg = registry();
//! let service = reg.get_node_type("Service").unwrap();
//! assert_eq!(service.natural_key, &["name"]);
//!
//! let node = NodeRecord::new("Service", vec!["nginx".into()], Tier::A, 1.0);
//! assert_eq!(node.node_ref().uid(), "Service:nginx");
//! ```

mod error;
mod registry;
mod types;

pub use error::SchemaError;
pub use registry::{
    registry, EdgeTypeDescriptor, NodeTypeDescriptor, PropKind, SchemaRegistry,
    DEFAULT_CONFIDENCE_THRESHOLD, SCHEMA_VERSION,
};
pub use types::{
    EdgeRecord, NodeRecord, NodeRef, PropValue, Provenance, Tier, TriplePacket,
};

pub mod tags {
    //! Canonical type tags. The registry is the only module that may mint a
    //! tag; everything else refers to these constants.

    pub mod node {
        pub const PERSON: &str = "Person";
        pub const ORGANIZATION: &str = "Organization";
        pub const PLACE: &str = "Place";
        pub const EVENT: &str = "Event";
        pub const FILE: &str = "File";
        pub const DOCUMENT: &str = "Document";
        pub const SERVICE: &str = "Service";
        pub const CONTAINER: &str = "Container";
        pub const COMPOSE_NETWORK: &str = "ComposeNetwork";
        pub const VOLUME: &str = "Volume";
        pub const REVERSE_PROXY: &str = "ReverseProxy";
        pub const ROUTE: &str = "Route";
        pub const UPSTREAM: &str = "Upstream";
        pub const HOST: &str = "Host";
        pub const IP_ADDRESS: &str = "IpAddress";
        pub const REPOSITORY: &str = "Repository";
        pub const ISSUE: &str = "Issue";
        pub const COMMIT: &str = "Commit";
        pub const EMAIL_MESSAGE: &str = "EmailMessage";
        pub const MAIL_THREAD: &str = "MailThread";
        pub const MAIL_LABEL: &str = "MailLabel";
        pub const DEVICE: &str = "Device";
        pub const NET_INTERFACE: &str = "NetInterface";
        pub const VLAN: &str = "Vlan";
        pub const FIREWALL_RULE: &str = "FirewallRule";
    }

    pub mod edge {
        pub const DEPENDS_ON: &str = "DEPENDS_ON";
        pub const ROUTES_TO: &str = "ROUTES_TO";
        pub const BINDS: &str = "BINDS";
        pub const RUNS: &str = "RUNS";
        pub const MENTIONS: &str = "MENTIONS";
        pub const EXPOSES: &str = "EXPOSES";
        pub const CONNECTS_TO: &str = "CONNECTS_TO";
        pub const MOUNTS: &str = "MOUNTS";
        pub const ATTACHED_TO: &str = "ATTACHED_TO";
        pub const PROXIES: &str = "PROXIES";
        pub const MEMBER_OF: &str = "MEMBER_OF";
        pub const LOCATED_IN: &str = "LOCATED_IN";
        pub const AUTHORED: &str = "AUTHORED";
        pub const REFERENCES: &str = "REFERENCES";
        pub const BELONGS_TO: &str = "BELONGS_TO";
        pub const TAGGED: &str = "TAGGED";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_kernel_tags() {
        let reg = registry();
        for tag in [
            tags::node::PERSON,
            tags::node::DOCUMENT,
            tags::node::SERVICE,
            tags::node::IP_ADDRESS,
            tags::node::FIREWALL_RULE,
        ] {
            let descriptor = reg.get_node_type(tag).expect("kernel tag registered");
            assert!(!descriptor.natural_key.is_empty(), "{tag} has a key");
        }
    }

    #[test]
    fn builtin_registry_resolves_edge_tags() {
        let reg = registry();
        for tag in [
            tags::edge::DEPENDS_ON,
            tags::edge::ROUTES_TO,
            tags::edge::MENTIONS,
        ] {
            assert!(reg.get_edge_type(tag).is_some(), "{tag} registered");
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert!(registry().get_node_type("Nope").is_none());
        assert!(registry().get_edge_type("NOPE").is_none());
    }
}
