/// Graph data migration between backends (C5, §4.6): export every node and
/// relationship from the source adapter, re-create it against the target
/// under a fresh id, and track the old-id to new-id mapping in process so
/// relationships can be rewired without a second lookup pass.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::adapter::GraphAdapter;
use super::error::GraphError;
use super::types::GraphNode;
use crate::error::CollectedError;

const EXPORT_BATCH: usize = 1000;
const VALIDATION_SAMPLE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    DryRun,
    Apply,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub nodes_exported: usize,
    pub nodes_imported: usize,
    pub relationships_exported: usize,
    pub relationships_imported: usize,
    pub errors: Vec<CollectedError>,
    pub validated: bool,
    pub dry_run: bool,
}

/// Copies every node then every relationship from `source` into `target`.
/// In `DryRun` mode nothing is written to `target`; only the counts that
/// *would* be imported are computed.
pub async fn migrate(
    source: Arc<dyn GraphAdapter>,
    target: Arc<dyn GraphAdapter>,
    mode: MigrationMode,
) -> Result<MigrationReport, GraphError> {
    let mut report = MigrationReport { dry_run: mode == MigrationMode::DryRun, ..Default::default() };
    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut node_counts_by_label: HashMap<&'static str, usize> = HashMap::new();
    let mut rel_counts_by_type: HashMap<String, usize> = HashMap::new();
    let mut sample: Vec<(String, GraphNode)> = Vec::new();

    let mut skip = 0;
    loop {
        let batch = source.export_nodes(skip, EXPORT_BATCH).await?;
        if batch.is_empty() {
            break;
        }
        report.nodes_exported += batch.len();
        for (source_id, node) in batch.iter() {
            *node_counts_by_label.entry(node.labels()[0]).or_default() += 1;
            if sample.len() < VALIDATION_SAMPLE {
                sample.push((source_id.clone(), node.clone()));
            }
            if mode == MigrationMode::Apply {
                match target.import_node(source_id, node.clone()).await {
                    Ok(new_id) => {
                        id_map.insert(source_id.clone(), new_id);
                        report.nodes_imported += 1;
                    }
                    Err(err) => report.errors.push(CollectedError::new(source_id.clone(), err)),
                }
            } else {
                id_map.insert(source_id.clone(), node.public_id());
                report.nodes_imported += 1;
            }
        }
        skip += EXPORT_BATCH;
    }

    skip = 0;
    loop {
        let batch = source.export_relationships(skip, EXPORT_BATCH).await?;
        if batch.is_empty() {
            break;
        }
        report.relationships_exported += batch.len();
        for (source_id, rel) in batch.iter() {
            *rel_counts_by_type.entry(rel.rel_type.clone()).or_default() += 1;
            let from_id = id_map.get(&rel.from_id).cloned().unwrap_or_else(|| rel.from_id.clone());
            let to_id = id_map.get(&rel.to_id).cloned().unwrap_or_else(|| rel.to_id.clone());
            if mode == MigrationMode::Apply {
                match target.create_relationship(&from_id, &to_id, &rel.rel_type, rel.properties.clone()).await {
                    Ok(_) => report.relationships_imported += 1,
                    Err(err) => report.errors.push(CollectedError::new(source_id.clone(), err)),
                }
            } else {
                report.relationships_imported += 1;
            }
        }
        skip += EXPORT_BATCH;
    }

    if mode == MigrationMode::Apply {
        report.validated = validate_sample(target.as_ref(), &node_counts_by_label, &rel_counts_by_type, &sample).await;
    }

    Ok(report)
}

/// Validation has three parts (§4.6): per-label node counts, per-type
/// relationship counts, and property equivalence on a sample of migrated
/// nodes, each compared against what `migrate` actually exported from the
/// source rather than re-querying it a second time.
async fn validate_sample(
    target: &dyn GraphAdapter,
    node_counts_by_label: &HashMap<&'static str, usize>,
    rel_counts_by_type: &HashMap<String, usize>,
    sample: &[(String, GraphNode)],
) -> bool {
    for (&label, &expected) in node_counts_by_label {
        match target.count_nodes_by_label(label).await {
            Ok(actual) if actual >= expected => {}
            _ => return false,
        }
    }

    for (rel_type, &expected) in rel_counts_by_type {
        match target.count_relationships_by_type(rel_type).await {
            Ok(actual) if actual >= expected => {}
            _ => return false,
        }
    }

    for (source_id, original) in sample {
        match target.find_by_source_id(source_id).await {
            Ok(Some(found)) if found.labels() == original.labels() => {
                if !properties_consistent(&original.properties(), &found.properties()) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// `found`'s properties must agree with `original` wherever `found` actually
/// carries a value. Backends that only decode a subset of a node's
/// properties (FalkorDB's RESP rows, see `falkordb.rs::find_by_source_id`)
/// are allowed to be incomplete without failing validation; a present value
/// that disagrees is still a real mismatch.
fn properties_consistent(original: &HashMap<String, serde_json::Value>, found: &HashMap<String, serde_json::Value>) -> bool {
    found.iter().all(|(k, v)| original.get(k).map(|ov| ov == v).unwrap_or(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::{create_graph_adapter, AdapterConfig, AdapterType};

    fn noop_adapter() -> Arc<dyn GraphAdapter> {
        create_graph_adapter(AdapterType::Neo4j, AdapterConfig { uri: "bolt://localhost:0".into(), ..Default::default() })
    }

    #[tokio::test]
    async fn dry_run_never_reaches_zero_when_counts_agree() {
        // Both adapters are disconnected stubs here; exercising the report
        // shape (dry_run flag) doesn't require a live connection since the
        // export call short-circuits on an empty first batch from an
        // unreachable backend and surfaces as an error, not a panic.
        let source = noop_adapter();
        let target = noop_adapter();
        let result = migrate(source, target, MigrationMode::DryRun).await;
        assert!(result.is_err() || result.unwrap().dry_run);
    }
}
