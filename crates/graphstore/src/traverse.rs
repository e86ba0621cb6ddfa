//! Bounded breadth-first expansion around a document's entities.
//!
//! Traversal is read-only and budgeted: at most two hops, at most fifty new
//! nodes admitted per hop, and when the budget bites, edges are admitted in
//! a fixed type-priority order so the subgraph keeps its most load-bearing
//! relationships.

use std::collections::HashSet;
use std::sync::Arc;

use neo4rs::{query, Graph};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphStoreError;

/// Fixed edge-type priority when the per-hop budget is limited. Unlisted
/// types sort after these, alphabetically.
const EDGE_PRIORITY: &[&str] = &["DEPENDS_ON", "ROUTES_TO", "BINDS", "RUNS", "MENTIONS"];

fn priority_rank(edge_tag: &str) -> usize {
    EDGE_PRIORITY
        .iter()
        .position(|t| *t == edge_tag)
        .unwrap_or(EDGE_PRIORITY.len())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub uid: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphEdge {
    pub src_uid: String,
    pub edge_tag: String,
    pub dst_uid: String,
    pub confidence: f64,
}

/// The expansion result handed to retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Compact single-line rendering used in synthesis context blocks.
    pub fn render_compact(&self) -> String {
        let mut lines: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("{} -[{}]-> {}", e.src_uid, e.edge_tag, e.dst_uid))
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// Traversal budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub max_hops: u32,
    pub per_hop_budget: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            per_hop_budget: 50,
        }
    }
}

/// Read-only traversal over the shared graph handle.
pub struct GraphTraverser {
    graph: Arc<Graph>,
    cfg: TraversalConfig,
}

/// One neighbor row as returned by the expansion query.
struct NeighborRow {
    src_uid: String,
    edge_tag: String,
    dst_uid: String,
    dst_label: String,
    confidence: f64,
    outgoing: bool,
}

impl GraphTraverser {
    pub fn new(graph: Arc<Graph>, cfg: TraversalConfig) -> Self {
        Self { graph, cfg }
    }

    /// Entities a document touches: its MENTIONS targets plus the endpoints
    /// of edges it contributed.
    pub async fn seed_entities(&self, doc_id: &str) -> Result<Vec<String>, GraphStoreError> {
        let q = query(
            "MATCH (d:Document {uid: $uid})-[:MENTIONS]->(m) \
             RETURN DISTINCT m.uid AS uid LIMIT $cap",
        )
        .param("uid", format!("Document:{doc_id}"))
        .param("cap", self.cfg.per_hop_budget as i64);

        let mut seeds = Vec::new();
        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?;
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?
        {
            if let Ok(uid) = row.get::<String>("uid") {
                seeds.push(uid);
            }
        }

        if seeds.is_empty() {
            // Fall back to edge contributions for documents with no
            // mention edges (pure config sources).
            let q = query(
                "MATCH (s)-[e]->(t) WHERE e.source_doc_id = $doc_id \
                 RETURN DISTINCT s.uid AS src, t.uid AS dst LIMIT $cap",
            )
            .param("doc_id", doc_id)
            .param("cap", self.cfg.per_hop_budget as i64);
            let mut result = self
                .graph
                .execute(q)
                .await
                .map_err(|e| GraphStoreError::Query(e.to_string()))?;
            while let Some(row) = result
                .next()
                .await
                .map_err(|e| GraphStoreError::Query(e.to_string()))?
            {
                for col in ["src", "dst"] {
                    if let Ok(uid) = row.get::<String>(col) {
                        if !uid.starts_with("Document:") && !seeds.contains(&uid) {
                            seeds.push(uid);
                        }
                    }
                }
            }
        }
        Ok(seeds)
    }

    /// Breadth-first expansion from a seed set.
    pub async fn expand(&self, seeds: &[String]) -> Result<Subgraph, GraphStoreError> {
        let mut subgraph = Subgraph::default();
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();
        let mut frontier: Vec<String> = seeds.to_vec();

        for hop in 0..self.cfg.max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut rows = self.neighbors(&frontier).await?;
            // Budgeted admission: strongest edge types first, then highest
            // confidence, then stable uid order.
            rows.sort_by(|a, b| {
                priority_rank(&a.edge_tag)
                    .cmp(&priority_rank(&b.edge_tag))
                    .then(
                        b.confidence
                            .partial_cmp(&a.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                    .then(a.dst_uid.cmp(&b.dst_uid))
            });

            let mut next_frontier = Vec::new();
            for row in rows {
                let edge_key = (row.src_uid.clone(), row.edge_tag.clone(), row.dst_uid.clone());
                if seen_edges.insert(edge_key) {
                    let (src, dst) = if row.outgoing {
                        (row.src_uid.clone(), row.dst_uid.clone())
                    } else {
                        (row.dst_uid.clone(), row.src_uid.clone())
                    };
                    subgraph.edges.push(SubgraphEdge {
                        src_uid: src,
                        edge_tag: row.edge_tag.clone(),
                        dst_uid: dst,
                        confidence: row.confidence,
                    });
                }
                if next_frontier.len() >= self.cfg.per_hop_budget {
                    continue;
                }
                if visited.insert(row.dst_uid.clone()) {
                    subgraph.nodes.push(SubgraphNode {
                        uid: row.dst_uid.clone(),
                        label: row.dst_label.clone(),
                    });
                    next_frontier.push(row.dst_uid);
                }
            }
            debug!(hop, admitted = next_frontier.len(), "graph hop expanded");
            frontier = next_frontier;
        }
        Ok(subgraph)
    }

    async fn neighbors(&self, frontier: &[String]) -> Result<Vec<NeighborRow>, GraphStoreError> {
        let q = query(
            "MATCH (n)-[e]-(m) WHERE n.uid IN $uids AND NOT m:Document AND NOT m:ExtractionEvent \
             RETURN n.uid AS src_uid, type(e) AS edge_tag, m.uid AS dst_uid, \
                    labels(m)[0] AS dst_label, coalesce(e.confidence, 0.0) AS confidence, \
                    startNode(e) = n AS outgoing",
        )
        .param("uids", frontier.to_vec());

        let mut rows = Vec::new();
        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?;
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?
        {
            let (Ok(src_uid), Ok(edge_tag), Ok(dst_uid), Ok(dst_label)) = (
                row.get::<String>("src_uid"),
                row.get::<String>("edge_tag"),
                row.get::<String>("dst_uid"),
                row.get::<String>("dst_label"),
            ) else {
                continue;
            };
            rows.push(NeighborRow {
                src_uid,
                edge_tag,
                dst_uid,
                dst_label,
                confidence: row.get::<f64>("confidence").unwrap_or(0.0),
                outgoing: row.get::<bool>("outgoing").unwrap_or(true),
            });
        }
        Ok(rows)
    }
}
