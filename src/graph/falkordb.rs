/// FalkorDB backend (§4.3 dialect table): RESP wire protocol via the
/// `GRAPH.QUERY` command, using the same `redis` crate + `ConnectionManager`
/// idiom the pack's Redis-backed stores use for their async connections.
use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value as RedisValue};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::adapter::{clamp_depth, AdapterConfig, AdapterType, ContextResult, ContextSpec, DependencyAnalysisSpec, GraphAdapter};
use super::error::GraphError;
use super::schema::{falkordb_file_id, schema_statements, validate_identifier, validate_identifiers};
use super::types::{impact_score, shell_node, DependencyResult, Direction, GraphNode, QueryMetadata, Relationship};

const GRAPH_NAME: &str = "codegraph";

pub struct FalkorDbAdapter {
    config: AdapterConfig,
    conn: OnceCell<ConnectionManager>,
}

impl FalkorDbAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config, conn: OnceCell::new() }
    }

    async fn connection(&self) -> Result<ConnectionManager, GraphError> {
        self.conn
            .get_or_try_init(|| async {
                let client = Client::open(self.config.uri.as_str()).map_err(|e| GraphError::Connection(e.to_string()))?;
                ConnectionManager::new(client).await.map_err(|e| GraphError::Connection(e.to_string()))
            })
            .await
            .map(Clone::clone)
    }

    async fn query(&self, cypher: &str) -> Result<RedisValue, GraphError> {
        let mut conn = self.connection().await?;
        redis::cmd("GRAPH.QUERY")
            .arg(GRAPH_NAME)
            .arg(cypher)
            .query_async(&mut conn)
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })
    }

    /// FalkorDB returns `[header, rows, stats]`; the row count is the length
    /// of the second element when present. Full row decoding is left to the
    /// query-service layer, which already knows its column shapes.
    fn row_count(result: &RedisValue) -> usize {
        if let RedisValue::Bulk(items) = result {
            if let Some(RedisValue::Bulk(rows)) = items.get(1) {
                return rows.len();
            }
        }
        0
    }

    /// Reads the single scalar cell of a `RETURN count(...)` response, as
    /// opposed to `row_count` which only counts how many rows came back
    /// (always 1 for an aggregate).
    fn scalar_count(result: &RedisValue) -> usize {
        if let RedisValue::Bulk(items) = result {
            if let Some(RedisValue::Bulk(rows)) = items.get(1) {
                if let Some(RedisValue::Bulk(cells)) = rows.first() {
                    if let Some(cell) = cells.first() {
                        return redis_value_to_string(cell).parse().unwrap_or(0);
                    }
                }
            }
        }
        0
    }
}

#[async_trait]
impl GraphAdapter for FalkorDbAdapter {
    async fn connect(&self) -> Result<(), GraphError> {
        self.connection().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.query("RETURN 1").await.is_ok()
    }

    async fn run_query(&self, query: &str, _params: HashMap<String, Value>) -> Result<Vec<HashMap<String, Value>>, GraphError> {
        // FalkorDB has no server-side parameter binding; callers must embed
        // literals themselves for this escape hatch.
        let result = self.query(query).await?;
        Ok(vec![HashMap::new(); Self::row_count(&result)])
    }

    async fn upsert_node(&self, node: GraphNode) -> Result<GraphNode, GraphError> {
        validate_identifiers(node.labels())?;
        let label = node.labels()[0];
        let public_id = node.public_id();
        let props = node.properties();
        let prop_clause = props
            .iter()
            .map(|(k, v)| format!("{k}: {}", json_literal(v)))
            .collect::<Vec<_>>()
            .join(", ");
        let file_id_prop = if matches!(node, GraphNode::File { .. }) {
            format!(", file_id: '{}'", falkordb_file_id_from(&node))
        } else {
            String::new()
        };
        let cypher = format!(
            "MERGE (n:{label} {{ id: '{public_id}' }}) SET n += {{ {prop_clause}{file_id_prop} }}"
        );
        self.query(&cypher).await?;
        Ok(node)
    }

    async fn delete_node(&self, id: &str) -> Result<bool, GraphError> {
        self.query(&format!("MATCH (n {{ id: '{id}' }}) DETACH DELETE n")).await?;
        Ok(true)
    }

    async fn create_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: HashMap<String, Value>,
    ) -> Result<Relationship, GraphError> {
        validate_identifier(rel_type)?;
        let prop_clause = props.iter().map(|(k, v)| format!("{k}: {}", json_literal(v))).collect::<Vec<_>>().join(", ");
        let cypher = format!(
            "MATCH (a {{ id: '{from_id}' }}), (b {{ id: '{to_id}' }}) CREATE (a)-[r:{rel_type} {{ {prop_clause} }}]->(b)"
        );
        self.query(&cypher).await?;
        Ok(Relationship { id: None, from_id: from_id.to_string(), to_id: to_id.to_string(), rel_type: rel_type.to_string(), properties: props })
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool, GraphError> {
        self.query(&format!("MATCH ()-[r {{ id: '{id}' }}]->() DELETE r")).await?;
        Ok(true)
    }

    async fn traverse(
        &self,
        start_node: &str,
        relationships: &[String],
        depth: u8,
        direction: Direction,
        _repository: Option<&str>,
    ) -> Result<super::types::TraversalResult, GraphError> {
        validate_identifiers(relationships.iter().map(String::as_str))?;
        let depth = clamp_depth(depth);
        let rel_clause = if relationships.is_empty() { String::new() } else { format!(":{}", relationships.join("|")) };
        let (left, right) = direction_arrows(direction);
        let cypher = format!(
            "MATCH (start {{ id: '{start_node}' }}){left}[r{rel_clause}*1..{depth}]{right}(n) RETURN DISTINCT n.id, labels(n)[0]"
        );
        let result = self.query(&cypher).await?;
        let nodes = extract_rows(&result)
            .into_iter()
            .filter_map(|row| {
                let id = row.first()?.clone();
                let label = row.get(1)?.clone();
                Some(shell_node(&label, &id))
            })
            .collect();
        Ok(super::types::TraversalResult { nodes, relationships: Vec::new() })
    }

    async fn analyze_dependencies(&self, spec: DependencyAnalysisSpec) -> Result<DependencyResult, GraphError> {
        let direct = self
            .traverse(&spec.target, &["IMPORTS".into(), "CALLS".into()], 1, spec.direction, None)
            .await?;
        let transitive = if spec.transitive {
            Some(
                self.traverse(&spec.target, &["IMPORTS".into(), "CALLS".into()], clamp_depth(spec.max_depth), spec.direction, None)
                    .await?,
            )
        } else {
            None
        };
        let direct_count = direct.nodes.len();
        let transitive_count = transitive.as_ref().map(|t| t.nodes.len()).unwrap_or(0);
        Ok(DependencyResult {
            direct: direct.nodes.iter().map(GraphNode::public_id).collect(),
            transitive: transitive.map(|t| t.nodes.iter().map(GraphNode::public_id).collect()),
            impact_score: impact_score(direct_count, transitive_count),
            metadata: QueryMetadata::default(),
        })
    }

    async fn get_context(&self, spec: ContextSpec) -> Result<ContextResult, GraphError> {
        let mut context = Vec::new();
        for seed in &spec.seeds {
            let traversal = self.traverse(seed, &[], 1, Direction::Both, None).await?;
            context.extend(traversal.nodes);
        }
        Ok(ContextResult { context, metadata: HashMap::new() })
    }

    async fn ensure_schema(&self) -> Result<(), GraphError> {
        for statement in schema_statements(AdapterType::FalkorDb) {
            self.query(&statement).await?;
        }
        Ok(())
    }

    async fn count_nodes(&self) -> Result<usize, GraphError> {
        let result = self.query("MATCH (n) RETURN count(n)").await?;
        Ok(Self::scalar_count(&result))
    }

    async fn count_relationships(&self) -> Result<usize, GraphError> {
        let result = self.query("MATCH ()-[r]->() RETURN count(r)").await?;
        Ok(Self::scalar_count(&result))
    }

    async fn count_nodes_by_label(&self, label: &str) -> Result<usize, GraphError> {
        validate_identifier(label)?;
        let result = self.query(&format!("MATCH (n:{label}) RETURN count(n)")).await?;
        Ok(Self::scalar_count(&result))
    }

    async fn count_relationships_by_type(&self, rel_type: &str) -> Result<usize, GraphError> {
        validate_identifier(rel_type)?;
        let result = self.query(&format!("MATCH ()-[r:{rel_type}]->() RETURN count(r)")).await?;
        Ok(Self::scalar_count(&result))
    }

    /// Mirrors the Neo4j export's simplified row decoding (§4.6): only
    /// opaque id/label/source_id columns are pulled out, RESP arrays don't
    /// carry column names the way Bolt rows do.
    async fn export_nodes(&self, skip: usize, limit: usize) -> Result<Vec<(String, GraphNode)>, GraphError> {
        let cypher = format!(
            "MATCH (n) RETURN n.id, labels(n)[0], coalesce(n._source_id, n.id) ORDER BY n.id SKIP {skip} LIMIT {limit}"
        );
        let result = self.query(&cypher).await?;
        Ok(extract_rows(&result)
            .into_iter()
            .filter_map(|row| {
                let id = row.first()?.clone();
                let label = row.get(1)?.clone();
                let source_id = row.get(2).cloned().unwrap_or_else(|| id.clone());
                Some((source_id, shell_node(&label, &id)))
            })
            .collect())
    }

    async fn export_relationships(&self, skip: usize, limit: usize) -> Result<Vec<(String, Relationship)>, GraphError> {
        let cypher = format!(
            "MATCH (a)-[r]->(b) RETURN a.id, b.id, type(r) ORDER BY a.id SKIP {skip} LIMIT {limit}"
        );
        let result = self.query(&cypher).await?;
        Ok(extract_rows(&result)
            .into_iter()
            .filter_map(|row| {
                let from_id = row.first()?.clone();
                let to_id = row.get(1)?.clone();
                let rel_type = row.get(2)?.clone();
                let source_id = format!("{from_id}->{rel_type}->{to_id}");
                Some((source_id, Relationship { id: None, from_id, to_id, rel_type, properties: HashMap::new() }))
            })
            .collect())
    }

    async fn import_node(&self, source_id: &str, node: GraphNode) -> Result<String, GraphError> {
        validate_identifiers(node.labels())?;
        let label = node.labels()[0];
        let public_id = node.public_id();
        let props = node.properties();
        let prop_clause = props.iter().map(|(k, v)| format!("{k}: {}", json_literal(v))).collect::<Vec<_>>().join(", ");
        let cypher = format!(
            "CREATE (n:{label} {{ {prop_clause}, _source_id: '{source_id}', id: '{public_id}' }})"
        );
        self.query(&cypher).await?;
        Ok(public_id)
    }

    /// Decodes the real id/label of the stored node rather than returning a
    /// placeholder, so migration validation (§4.6) compares against what is
    /// actually there. FalkorDB's RESP row shape doesn't carry named
    /// properties the way Bolt rows do (see `export_nodes`), so the
    /// reconstructed node only carries the identity fields `shell_node`
    /// derives from label + id; full property equivalence is only exact on
    /// the Neo4j side.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<GraphNode>, GraphError> {
        let result = self
            .query(&format!("MATCH (n {{ _source_id: '{source_id}' }}) RETURN n.id, labels(n)[0]"))
            .await?;
        let rows = extract_rows(&result);
        Ok(rows.first().and_then(|row| {
            let id = row.first()?.clone();
            let label = row.get(1)?.clone();
            Some(shell_node(&label, &id))
        }))
    }
}

/// Maps a logical traversal direction onto Cypher's arrow syntax (§4.4):
/// `DependsOn` walks outgoing edges, `DependedOnBy` walks incoming edges,
/// `Both` is undirected.
fn direction_arrows(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::DependsOn => ("-", "->"),
        Direction::DependedOnBy => ("<-", "-"),
        Direction::Both => ("-", "-"),
    }
}

fn json_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "\\'")),
    }
}

fn redis_value_to_string(value: &RedisValue) -> String {
    match value {
        RedisValue::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
        RedisValue::Int(i) => i.to_string(),
        RedisValue::Status(s) => s.clone(),
        RedisValue::Nil => String::new(),
        other => format!("{other:?}"),
    }
}

fn extract_rows(result: &RedisValue) -> Vec<Vec<String>> {
    if let RedisValue::Bulk(items) = result {
        if let Some(RedisValue::Bulk(rows)) = items.get(1) {
            return rows
                .iter()
                .map(|row| match row {
                    RedisValue::Bulk(cells) => cells.iter().map(redis_value_to_string).collect(),
                    other => vec![redis_value_to_string(other)],
                })
                .collect();
        }
    }
    Vec::new()
}

fn falkordb_file_id_from(node: &GraphNode) -> String {
    match node {
        GraphNode::File { repository, path, .. } => falkordb_file_id(repository, path),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_literal_escapes_quotes() {
        assert_eq!(json_literal(&Value::String("o'brien".into())), "'o\\'brien'");
        assert_eq!(json_literal(&Value::Bool(true)), "true");
    }

    #[test]
    fn extract_rows_reads_cell_strings() {
        let response = RedisValue::Bulk(vec![
            RedisValue::Bulk(vec![]),
            RedisValue::Bulk(vec![RedisValue::Bulk(vec![
                RedisValue::Data(b"File:repo:a.rs".to_vec()),
                RedisValue::Data(b"File".to_vec()),
            ])]),
            RedisValue::Bulk(vec![]),
        ]);
        let rows = extract_rows(&response);
        assert_eq!(rows, vec![vec!["File:repo:a.rs".to_string(), "File".to_string()]]);
    }

    #[test]
    fn row_count_reads_falkordb_response_shape() {
        let response = RedisValue::Bulk(vec![
            RedisValue::Bulk(vec![]),
            RedisValue::Bulk(vec![RedisValue::Bulk(vec![]), RedisValue::Bulk(vec![])]),
            RedisValue::Bulk(vec![]),
        ]);
        assert_eq!(FalkorDbAdapter::row_count(&response), 2);
    }

    #[test]
    fn scalar_count_reads_the_aggregate_cell_not_the_row_count() {
        let response = RedisValue::Bulk(vec![
            RedisValue::Bulk(vec![]),
            RedisValue::Bulk(vec![RedisValue::Bulk(vec![RedisValue::Int(42)])]),
            RedisValue::Bulk(vec![]),
        ]);
        assert_eq!(FalkorDbAdapter::scalar_count(&response), 42);
    }
}
