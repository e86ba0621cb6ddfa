//! One-time store initialization: uniqueness constraints and lookup indexes
//! derived from the type catalog. Applied at `init`, never at steady state;
//! every statement is `IF NOT EXISTS` so re-running is harmless.

use std::sync::Arc;

use neo4rs::{query, Graph};
use tracing::info;

use schema::registry;

use crate::error::GraphStoreError;

/// Build the full constraint statement set from the registry.
pub fn constraint_statements() -> Vec<String> {
    let reg = registry();
    let mut statements = Vec::new();

    for descriptor in reg.all_node_types() {
        let tag = descriptor.type_tag;
        statements.push(format!(
            "CREATE CONSTRAINT {}_uid_unique IF NOT EXISTS \
             FOR (n:`{tag}`) REQUIRE n.uid IS UNIQUE",
            tag.to_lowercase()
        ));
        // Composite lookups hit the natural-key fields directly.
        let fields: Vec<String> = descriptor
            .natural_key
            .iter()
            .map(|f| format!("n.`{f}`"))
            .collect();
        statements.push(format!(
            "CREATE INDEX {}_key_idx IF NOT EXISTS FOR (n:`{tag}`) ON ({})",
            tag.to_lowercase(),
            fields.join(", ")
        ));
    }

    statements.push(
        "CREATE INDEX extraction_event_doc_idx IF NOT EXISTS \
         FOR (n:ExtractionEvent) ON (n.doc_id)"
            .to_string(),
    );
    statements.push(
        "CREATE INDEX document_state_idx IF NOT EXISTS \
         FOR (n:Document) ON (n.extraction_state)"
            .to_string(),
    );

    statements
}

/// Apply every constraint and index. Idempotent.
pub async fn apply_constraints(graph: &Arc<Graph>) -> Result<usize, GraphStoreError> {
    let statements = constraint_statements();
    for statement in &statements {
        graph
            .run(query(statement))
            .await
            .map_err(|e| GraphStoreError::Query(format!("{statement}: {e}")))?;
    }
    info!(count = statements.len(), "graph constraints applied");
    Ok(statements.len())
}

/// Cheap readiness probe.
pub async fn health_check(graph: &Arc<Graph>) -> Result<(), GraphStoreError> {
    let mut result = graph
        .execute(query("RETURN 1 AS ok"))
        .await
        .map_err(|e| GraphStoreError::Connect(e.to_string()))?;
    match result.next().await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(GraphStoreError::Connect("health probe returned no rows".into())),
        Err(e) => Err(GraphStoreError::Connect(e.to_string())),
    }
}
