//! Entity resolution across tier outputs.
//!
//! Nodes from all three tiers are canonicalized (lowercase, alias collapse,
//! FQDN/IP normalization) and grouped by `(type_tag, natural_key)`. Scalar
//! property collisions resolve by tier precedence A > B > C; list properties
//! union; confidence takes the max. Edges group by their composite key with
//! the same list/confidence rules, scalars resolving by max confidence and
//! then latest source timestamp.
//!
//! The acceptance thresholds from the type catalog are enforced here, before
//! anything reaches the writer: nothing below a type's threshold persists.

use std::collections::BTreeMap;

use tracing::debug;

use deterministic::lexicon;
use schema::{registry, EdgeRecord, NodeRecord, NodeRef, PropValue, TriplePacket};

/// Merged, deduplicated, threshold-filtered graph contribution of one
/// document.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub dropped_below_threshold: usize,
}

/// Canonicalize one natural-key component for a given node type.
pub fn canonical_key(type_tag: &str, raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    match type_tag {
        "Host" => lowered.trim_end_matches('.').to_string(),
        "IpAddress" => normalize_ip(&lowered),
        "Service" | "ReverseProxy" => lexicon::lookup(&lowered)
            .map(|entry| entry.canonical.to_string())
            .unwrap_or(lowered),
        _ => lowered,
    }
}

/// Strip leading zeros from IPv4 octets: `010.000.0.01` -> `10.0.0.1`.
fn normalize_ip(addr: &str) -> String {
    if !addr.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '/') {
        return addr.to_string();
    }
    let (ip_part, mask) = match addr.split_once('/') {
        Some((ip, mask)) => (ip, Some(mask)),
        None => (addr, None),
    };
    let octets: Vec<String> = ip_part
        .split('.')
        .map(|o| o.trim_start_matches('0').to_string())
        .map(|o| if o.is_empty() { "0".to_string() } else { o })
        .collect();
    let normalized = octets.join(".");
    match mask {
        Some(mask) => format!("{normalized}/{mask}"),
        None => normalized,
    }
}

fn canonical_ref(node_ref: &NodeRef) -> NodeRef {
    NodeRef::new(
        node_ref.type_tag.clone(),
        node_ref
            .natural_key
            .iter()
            .map(|k| canonical_key(&node_ref.type_tag, k))
            .collect(),
    )
}

/// Merge the tier packets of one document into a single write set.
pub fn resolve_packets(packets: Vec<TriplePacket>) -> ResolvedGraph {
    let reg = registry();
    let mut resolved = ResolvedGraph::default();

    // Nodes: group by canonical (type_tag, natural_key).
    let mut node_groups: BTreeMap<String, NodeRecord> = BTreeMap::new();
    for packet in &packets {
        for node in &packet.nodes {
            let mut node = node.clone();
            node.natural_key = node
                .natural_key
                .iter()
                .map(|k| canonical_key(&node.type_tag, k))
                .collect();
            let uid = node.node_ref().uid();

            match node_groups.get_mut(&uid) {
                None => {
                    node_groups.insert(uid, node);
                }
                Some(existing) => merge_node(existing, node),
            }
        }
    }

    // Edges: canonicalize endpoints, group by composite key.
    let mut edge_groups: BTreeMap<String, EdgeRecord> = BTreeMap::new();
    for packet in &packets {
        for edge in &packet.edges {
            let mut edge = edge.clone();
            edge.src = canonical_ref(&edge.src);
            edge.dst = canonical_ref(&edge.dst);
            let key = edge.composite_key();

            match edge_groups.get_mut(&key) {
                None => {
                    edge_groups.insert(key, edge);
                }
                Some(existing) => merge_edge(existing, edge),
            }
        }
    }

    for (_, node) in node_groups {
        let threshold = reg
            .get_node_type(&node.type_tag)
            .map(|d| d.confidence_threshold)
            .unwrap_or(schema::DEFAULT_CONFIDENCE_THRESHOLD);
        if node.confidence < threshold {
            resolved.dropped_below_threshold += 1;
            continue;
        }
        resolved.nodes.push(node);
    }
    for (_, edge) in edge_groups {
        if edge.confidence < reg.edge_threshold(&edge.type_tag) {
            debug!(
                edge = %edge.composite_key(),
                confidence = edge.confidence,
                "dropping edge below acceptance threshold"
            );
            resolved.dropped_below_threshold += 1;
            continue;
        }
        resolved.edges.push(edge);
    }

    resolved
}

/// Fold `incoming` into `existing` under the node rules.
fn merge_node(existing: &mut NodeRecord, incoming: NodeRecord) {
    let incoming_wins = incoming.tier.precedence() > existing.tier.precedence();

    for (name, value) in incoming.props {
        match existing.props.get_mut(&name) {
            None => {
                existing.props.insert(name, value);
            }
            Some(current) => {
                if current.is_list() && value.is_list() {
                    if let (PropValue::StrList(current_items), PropValue::StrList(new_items)) =
                        (current, value)
                    {
                        for item in new_items {
                            if !current_items.contains(&item) {
                                current_items.push(item);
                            }
                        }
                        current_items.sort();
                    }
                } else if incoming_wins {
                    *current = value;
                }
            }
        }
    }

    if incoming_wins {
        existing.tier = incoming.tier;
    }
    existing.confidence = existing.confidence.max(incoming.confidence);
}

/// Fold `incoming` into `existing` under the edge rules: max confidence
/// wins scalars, latest source timestamp breaks ties.
fn merge_edge(existing: &mut EdgeRecord, incoming: EdgeRecord) {
    let incoming_wins = incoming.confidence > existing.confidence
        || (incoming.confidence == existing.confidence
            && incoming.source_timestamp > existing.source_timestamp);

    for (name, value) in incoming.props {
        match existing.props.get_mut(&name) {
            None => {
                existing.props.insert(name, value);
            }
            Some(current) => {
                if current.is_list() && value.is_list() {
                    if let (PropValue::StrList(current_items), PropValue::StrList(new_items)) =
                        (current, value)
                    {
                        for item in new_items {
                            if !current_items.contains(&item) {
                                current_items.push(item);
                            }
                        }
                        current_items.sort();
                    }
                } else if incoming_wins {
                    *current = value;
                }
            }
        }
    }

    if incoming_wins {
        existing.tier = incoming.tier;
        existing.source_timestamp = incoming.source_timestamp;
    }
    existing.confidence = existing.confidence.max(incoming.confidence);
}
