use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::error::GraphError;
use super::falkordb::FalkorDbAdapter;
use super::neo4j::Neo4jAdapter;
use super::types::{Direction, GraphNode, Relationship, TraversalResult};
use crate::util::backoff::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Neo4j,
    FalkorDb,
}

impl Default for AdapterType {
    fn default() -> Self {
        AdapterType::Neo4j
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    pub retry_policy: BackoffPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            username: None,
            password: None,
            database: None,
            pool_size: 10,
            acquire_timeout: Duration::from_secs(5),
            retry_policy: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyAnalysisSpec {
    pub target: String,
    pub direction: Direction,
    pub transitive: bool,
    pub max_depth: u8,
}

#[derive(Debug, Clone, Default)]
pub struct ContextSpec {
    pub seeds: Vec<String>,
    pub include_context: Vec<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ContextResult {
    pub context: Vec<GraphNode>,
    pub metadata: HashMap<String, Value>,
}

pub const MAX_TRAVERSAL_DEPTH: u8 = 5;

/// Uniform capability interface over both backing graph engines (§4.3). A
/// `GraphQueryService` borrows `Arc<dyn GraphAdapter>` and must never outlive
/// it (§3.9).
#[async_trait]
pub trait GraphAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), GraphError>;
    async fn disconnect(&self) -> Result<(), GraphError>;
    async fn health_check(&self) -> bool;

    async fn run_query(&self, query: &str, params: HashMap<String, Value>) -> Result<Vec<HashMap<String, Value>>, GraphError>;

    async fn upsert_node(&self, node: GraphNode) -> Result<GraphNode, GraphError>;
    async fn delete_node(&self, id: &str) -> Result<bool, GraphError>;

    async fn create_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: HashMap<String, Value>,
    ) -> Result<Relationship, GraphError>;
    async fn delete_relationship(&self, id: &str) -> Result<bool, GraphError>;

    async fn traverse(
        &self,
        start_node: &str,
        relationships: &[String],
        depth: u8,
        direction: Direction,
        repository: Option<&str>,
    ) -> Result<TraversalResult, GraphError>;

    async fn analyze_dependencies(&self, spec: DependencyAnalysisSpec) -> Result<super::types::DependencyResult, GraphError>;

    async fn get_context(&self, spec: ContextSpec) -> Result<ContextResult, GraphError>;

    async fn ensure_schema(&self) -> Result<(), GraphError>;

    /// Count nodes/relationships by label/type for migration validation.
    async fn count_nodes(&self) -> Result<usize, GraphError>;
    async fn count_relationships(&self) -> Result<usize, GraphError>;
    async fn count_nodes_by_label(&self, label: &str) -> Result<usize, GraphError>;
    async fn count_relationships_by_type(&self, rel_type: &str) -> Result<usize, GraphError>;

    /// Streams nodes/relationships in stable batches for export (C5).
    async fn export_nodes(&self, skip: usize, limit: usize) -> Result<Vec<(String, GraphNode)>, GraphError>;
    async fn export_relationships(&self, skip: usize, limit: usize) -> Result<Vec<(String, Relationship)>, GraphError>;

    /// Imports one node carrying its original id in a reserved `_source_id`
    /// property; returns the freshly minted backend id (§4.6).
    async fn import_node(&self, source_id: &str, node: GraphNode) -> Result<String, GraphError>;
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<GraphNode>, GraphError>;
}

pub fn clamp_depth(depth: u8) -> u8 {
    depth.min(MAX_TRAVERSAL_DEPTH)
}

/// The only construction site for a graph adapter (§4.3): callers never
/// instantiate `Neo4jAdapter`/`FalkorDbAdapter` directly.
pub fn create_graph_adapter(kind: AdapterType, config: AdapterConfig) -> Arc<dyn GraphAdapter> {
    match kind {
        AdapterType::Neo4j => Arc::new(Neo4jAdapter::new(config)),
        AdapterType::FalkorDb => Arc::new(FalkorDbAdapter::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_above_five_is_clamped() {
        assert_eq!(clamp_depth(6), 5);
        assert_eq!(clamp_depth(1), 1);
        assert_eq!(clamp_depth(255), 5);
    }
}
