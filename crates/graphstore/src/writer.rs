//! Batched, idempotent upserts of nodes and edges.
//!
//! Rows are grouped by type tag (and endpoint labels for edges), applied as
//! one parameterized `UNWIND ... MERGE` statement per batch inside a single
//! transaction. Nodes merge on their `uid` (the type tag plus natural-key
//! values); edges merge on the composite key, so re-extraction upserts
//! instead of duplicating. Edge endpoints are merged with
//! `status = 'unresolved'` when absent; a later full node write flips them
//! to `resolved`.
//!
//! A batch that fails is bisected and retried; a single row that still
//! fails is quarantined to the dead-letter queue and the rest of the batch
//! commits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use neo4rs::{query, Graph};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use schema::{registry, EdgeRecord, NodeRecord, SCHEMA_VERSION};
use staging::{DeadLetterQueue, FailureCause, UnitKind};

use crate::bolt::{bolt_float, bolt_string, rows_param, RowMap};
use crate::error::GraphStoreError;

/// Write-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphWriteConfig {
    /// Rows per transaction.
    pub batch_size: usize,
    /// How many times a failing batch is bisected before single rows are
    /// quarantined.
    pub max_split_depth: u32,
    pub batch_timeout_secs: u64,
}

impl Default for GraphWriteConfig {
    fn default() -> Self {
        Self {
            batch_size: 2_000,
            max_split_depth: 3,
            batch_timeout_secs: 60,
        }
    }
}

/// Counters from one write call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WriteReport {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub rows_quarantined: usize,
    pub batches: usize,
    pub splits: usize,
}

impl WriteReport {
    fn merge(&mut self, other: WriteReport) {
        self.nodes_written += other.nodes_written;
        self.edges_written += other.edges_written;
        self.rows_quarantined += other.rows_quarantined;
        self.batches += other.batches;
        self.splits += other.splits;
    }
}

/// The only mutator of graph state.
pub struct GraphWriter {
    graph: Arc<Graph>,
    dlq: Arc<DeadLetterQueue>,
    cfg: GraphWriteConfig,
}

impl GraphWriter {
    pub fn new(graph: Arc<Graph>, dlq: Arc<DeadLetterQueue>, cfg: GraphWriteConfig) -> Self {
        Self { graph, dlq, cfg }
    }

    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        dlq: Arc<DeadLetterQueue>,
        cfg: GraphWriteConfig,
    ) -> Result<Self, GraphStoreError> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| GraphStoreError::Connect(e.to_string()))?;
        Ok(Self::new(Arc::new(graph), dlq, cfg))
    }

    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    /// Upsert a set of nodes grouped by type tag.
    pub async fn upsert_nodes(&self, nodes: &[NodeRecord]) -> Result<WriteReport, GraphStoreError> {
        let mut report = WriteReport::default();
        let mut groups: BTreeMap<&str, Vec<&NodeRecord>> = BTreeMap::new();
        for node in nodes {
            groups.entry(node.type_tag.as_str()).or_default().push(node);
        }

        for (tag, group) in groups {
            if registry().get_node_type(tag).is_none() {
                return Err(GraphStoreError::UnknownTag(tag.to_string()));
            }
            let statement = node_merge_statement(tag);
            for batch in group.chunks(self.cfg.batch_size.max(1)) {
                let sub = self
                    .apply_rows(&statement, batch, node_row, 0)
                    .await?;
                report.merge(sub);
            }
            metrics::counter!("tessera_graph_nodes_written", "type_tag" => tag.to_string())
                .increment(group.len() as u64);
        }
        report.nodes_written = nodes.len() - report.rows_quarantined;
        info!(
            nodes = report.nodes_written,
            quarantined = report.rows_quarantined,
            batches = report.batches,
            "graph_nodes_upserted"
        );
        Ok(report)
    }

    /// Upsert a set of edges grouped by (edge tag, src label, dst label).
    pub async fn upsert_edges(&self, edges: &[EdgeRecord]) -> Result<WriteReport, GraphStoreError> {
        let mut report = WriteReport::default();
        let mut groups: BTreeMap<(String, String, String), Vec<&EdgeRecord>> = BTreeMap::new();
        for edge in edges {
            groups
                .entry((
                    edge.type_tag.clone(),
                    edge.src.type_tag.clone(),
                    edge.dst.type_tag.clone(),
                ))
                .or_default()
                .push(edge);
        }

        for ((edge_tag, src_tag, dst_tag), group) in groups {
            if registry().get_edge_type(&edge_tag).is_none() {
                return Err(GraphStoreError::UnknownTag(edge_tag));
            }
            let statement = edge_merge_statement(&edge_tag, &src_tag, &dst_tag);
            for batch in group.chunks(self.cfg.batch_size.max(1)) {
                let sub = self.apply_rows(&statement, batch, edge_row, 0).await?;
                report.merge(sub);
            }
            metrics::counter!("tessera_graph_edges_written", "type_tag" => edge_tag.clone())
                .increment(group.len() as u64);
        }
        report.edges_written = edges.len() - report.rows_quarantined;
        info!(
            edges = report.edges_written,
            quarantined = report.rows_quarantined,
            batches = report.batches,
            "graph_edges_upserted"
        );
        Ok(report)
    }

    /// Remove every edge contribution of `doc_id` whose extractor version is
    /// not in `keep_versions`. Called after a successful reprocess so the new
    /// contribution supersedes the old one exactly.
    pub async fn supersede_document(
        &self,
        doc_id: &str,
        keep_versions: &[&str],
    ) -> Result<u64, GraphStoreError> {
        let keep: Vec<String> = keep_versions.iter().map(|v| v.to_string()).collect();
        let q = query(
            "MATCH ()-[e]->() \
             WHERE e.source_doc_id = $doc_id AND NOT e.extractor_version IN $keep \
             DELETE e RETURN count(e) AS removed",
        )
        .param("doc_id", doc_id)
        .param("keep", keep);

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?;
        let removed = match result.next().await {
            Ok(Some(row)) => row.get::<i64>("removed").unwrap_or(0),
            _ => 0,
        };
        debug!(doc_id, removed, "superseded stale edge versions");
        Ok(removed.max(0) as u64)
    }

    /// Admin purge: delete exactly the edges keyed to this document (all
    /// extractor versions), leaving shared nodes in place.
    pub async fn purge_document(&self, doc_id: &str) -> Result<(), GraphStoreError> {
        let q = query("MATCH ()-[e]->() WHERE e.source_doc_id = $doc_id DELETE e")
            .param("doc_id", doc_id);
        self.graph
            .run(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))?;
        let q = query("MATCH (d:Document {uid: $uid}) DETACH DELETE d")
            .param("uid", format!("Document:{doc_id}"));
        self.graph
            .run(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))
    }

    /// Append one lifecycle transition to the event log.
    pub async fn record_event(
        &self,
        job_id: &str,
        doc_id: &str,
        from: &str,
        to: &str,
        reason: &str,
        attempt: u32,
    ) -> Result<(), GraphStoreError> {
        let q = query(
            "CREATE (ev:ExtractionEvent {job_id: $job_id, doc_id: $doc_id, \
             from: $from, to: $to, reason: $reason, attempt: $attempt, at: $at})",
        )
        .param("job_id", job_id)
        .param("doc_id", doc_id)
        .param("from", from)
        .param("to", to)
        .param("reason", reason)
        .param("attempt", i64::from(attempt))
        .param("at", Utc::now().to_rfc3339());

        self.graph
            .run(q)
            .await
            .map_err(|e| GraphStoreError::Query(e.to_string()))
    }

    /// Apply one statement over a row batch, bisecting on failure.
    async fn apply_rows<T: RowSource + ?Sized>(
        &self,
        statement: &str,
        batch: &[&T],
        to_row: fn(&T) -> neo4rs::BoltType,
        depth: u32,
    ) -> Result<WriteReport, GraphStoreError> {
        let mut report = WriteReport {
            batches: 1,
            ..WriteReport::default()
        };

        let rows = rows_param(batch.iter().map(|r| to_row(r)).collect());
        let q = query(statement).param("rows", rows);
        let budget = Duration::from_secs(self.cfg.batch_timeout_secs);

        let outcome = timeout(budget, self.graph.run(q)).await;
        match outcome {
            Ok(Ok(())) => Ok(report),
            Ok(Err(err)) => {
                if batch.len() == 1 || depth >= self.cfg.max_split_depth {
                    // Binary isolation bottomed out: quarantine what is left.
                    for row in batch {
                        warn!(key = %row.quarantine_key(), error = %err, "quarantining graph row");
                        self.dlq.push(
                            &row.quarantine_key(),
                            &row.payload_head(),
                            UnitKind::Document,
                            FailureCause::GraphWrite,
                        );
                        report.rows_quarantined += 1;
                    }
                    return Ok(report);
                }
                report.splits += 1;
                let mid = batch.len() / 2;
                let left = Box::pin(self.apply_rows(statement, &batch[..mid], to_row, depth + 1));
                let right = Box::pin(self.apply_rows(statement, &batch[mid..], to_row, depth + 1));
                report.merge(left.await?);
                report.merge(right.await?);
                Ok(report)
            }
            Err(_) => Err(GraphStoreError::Timeout(self.cfg.batch_timeout_secs)),
        }
    }
}

/// Anything that can be turned into an UNWIND row and described in a
/// quarantine entry.
pub trait RowSource {
    fn quarantine_key(&self) -> String;
    fn payload_head(&self) -> String;
}

impl RowSource for NodeRecord {
    fn quarantine_key(&self) -> String {
        format!("node:{}", self.node_ref().uid())
    }

    fn payload_head(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl RowSource for EdgeRecord {
    fn quarantine_key(&self) -> String {
        format!("edge:{}", self.composite_key())
    }

    fn payload_head(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn node_merge_statement(tag: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MERGE (n:`{tag}` {{uid: row.uid}}) \
         ON CREATE SET n.created_at = row.now \
         ON MATCH SET n.last_seen = row.now \
         SET n += row.props, n.status = 'resolved', n.schema_version = row.schema_version, \
             n.confidence = row.confidence"
    )
}

fn edge_merge_statement(edge_tag: &str, src_tag: &str, dst_tag: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MERGE (s:`{src_tag}` {{uid: row.src_uid}}) \
         ON CREATE SET s.status = 'unresolved', s.created_at = row.now \
         MERGE (d:`{dst_tag}` {{uid: row.dst_uid}}) \
         ON CREATE SET d.status = 'unresolved', d.created_at = row.now \
         MERGE (s)-[e:`{edge_tag}` {{source_doc_id: row.source_doc_id, \
             extractor_version: row.extractor_version}}]->(d) \
         ON CREATE SET e.created_at = row.now \
         ON MATCH SET e.last_seen = row.now \
         SET e += row.props, e.tier = row.tier, e.confidence = row.confidence, \
             e.schema_version = row.schema_version, e.source_timestamp = row.source_timestamp"
    )
}

fn node_row(node: &NodeRecord) -> neo4rs::BoltType {
    RowMap::new()
        .put("uid", bolt_string(&node.node_ref().uid()))
        .put("now", bolt_string(&Utc::now().to_rfc3339()))
        .put("schema_version", bolt_string(SCHEMA_VERSION))
        .put("confidence", bolt_float(node.confidence))
        .put_props("props", &node.props)
        .build()
}

fn edge_row(edge: &EdgeRecord) -> neo4rs::BoltType {
    let source_timestamp = edge
        .source_timestamp
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_default();
    RowMap::new()
        .put("src_uid", bolt_string(&edge.src.uid()))
        .put("dst_uid", bolt_string(&edge.dst.uid()))
        .put("source_doc_id", bolt_string(&edge.source_doc_id))
        .put("extractor_version", bolt_string(&edge.extractor_version))
        .put("tier", bolt_string(edge.tier.as_str()))
        .put("confidence", bolt_float(edge.confidence))
        .put("schema_version", bolt_string(SCHEMA_VERSION))
        .put("source_timestamp", bolt_string(&source_timestamp))
        .put("now", bolt_string(&Utc::now().to_rfc3339()))
        .put_props("props", &edge.props)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{NodeRef, Tier};

    #[test]
    fn node_statement_merges_on_uid() {
        let statement = node_merge_statement("Service");
        assert!(statement.contains("MERGE (n:`Service` {uid: row.uid})"));
        assert!(statement.contains("ON CREATE"));
        assert!(statement.contains("ON MATCH"));
        assert!(statement.contains("n.status = 'resolved'"));
    }

    #[test]
    fn edge_statement_stubs_endpoints() {
        let statement = edge_merge_statement("DEPENDS_ON", "Service", "Service");
        assert!(statement.contains("s.status = 'unresolved'"));
        assert!(statement.contains("MERGE (s)-[e:`DEPENDS_ON`"));
        assert!(statement.contains("source_doc_id: row.source_doc_id"));
        assert!(statement.contains("extractor_version: row.extractor_version"));
    }

    #[test]
    fn edge_row_carries_composite_key_fields() {
        let edge = EdgeRecord::new(
            "DEPENDS_ON",
            NodeRef::new("Service", vec!["api".into()]),
            NodeRef::new("Service", vec!["db".into()]),
            "doc-1",
            "2.1.0",
            Tier::A,
            1.0,
        );
        // Row construction must not panic and must be a map.
        assert!(matches!(edge_row(&edge), neo4rs::BoltType::Map(_)));
        assert_eq!(edge.quarantine_key(), "edge:DEPENDS_ON|Service:api|Service:db|doc-1|2.1.0");
    }
}
