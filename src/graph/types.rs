/// Polymorphic node/edge model shared by both graph backends (§3.4/§3.5).
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GraphNode {
    Repository { name: String, url: String, last_indexed: Option<String>, status: String },
    File { path: String, extension: Option<String>, hash: String, repository: String },
    Function {
        name: String,
        signature: Option<String>,
        start_line: usize,
        end_line: usize,
        file_path: String,
        repository: String,
    },
    Class {
        name: String,
        r#type: String,
        file_path: String,
        start_line: usize,
        end_line: usize,
        repository: String,
    },
    Module { name: String, r#type: String, version: Option<String> },
    Chunk { chroma_id: String, chunk_index: usize, file_path: String, repository: String },
    Concept { name: String, description: String, confidence: f32 },
}

impl GraphNode {
    /// Backend-agnostic label set used both for identifier validation and
    /// for the Cypher/GRAPH.QUERY label clause.
    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            GraphNode::Repository { .. } => vec!["Repository"],
            GraphNode::File { .. } => vec!["File"],
            GraphNode::Function { .. } => vec!["Function"],
            GraphNode::Class { .. } => vec!["Class"],
            GraphNode::Module { .. } => vec!["Module"],
            GraphNode::Chunk { .. } => vec!["Chunk"],
            GraphNode::Concept { .. } => vec!["Concept"],
        }
    }

    /// The backend-specific identity key predicate for this node, used by
    /// `upsertNode` to find-or-create rather than blindly insert.
    pub fn identity_keys(&self) -> HashMap<&'static str, Value> {
        let mut keys = HashMap::new();
        match self {
            GraphNode::Repository { name, .. } => {
                keys.insert("name", Value::String(name.clone()));
            }
            GraphNode::File { path, repository, .. } => {
                keys.insert("repository", Value::String(repository.clone()));
                keys.insert("path", Value::String(path.clone()));
            }
            GraphNode::Function { name, file_path, repository, .. } => {
                keys.insert("repository", Value::String(repository.clone()));
                keys.insert("file_path", Value::String(file_path.clone()));
                keys.insert("name", Value::String(name.clone()));
            }
            GraphNode::Class { name, file_path, repository, .. } => {
                keys.insert("repository", Value::String(repository.clone()));
                keys.insert("file_path", Value::String(file_path.clone()));
                keys.insert("name", Value::String(name.clone()));
            }
            GraphNode::Module { name, .. } => {
                keys.insert("name", Value::String(name.clone()));
            }
            GraphNode::Chunk { chroma_id, .. } => {
                keys.insert("chroma_id", Value::String(chroma_id.clone()));
            }
            GraphNode::Concept { name, .. } => {
                keys.insert("name", Value::String(name.clone()));
            }
        }
        keys
    }

    /// A stable, backend-external identifier derived from the node's
    /// identity keys — used by `deleteNode`/`createRelationship` endpoints
    /// so callers never need to know a backend's internal row id.
    pub fn public_id(&self) -> String {
        let label = self.labels()[0];
        let mut keys: Vec<_> = self.identity_keys().into_iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        let joined = keys
            .into_iter()
            .map(|(_, v)| v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(":");
        format!("{label}:{joined}")
    }

    pub fn properties(&self) -> HashMap<String, Value> {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .map(|obj| obj.into_iter().filter(|(k, _)| k != "kind").collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Contains,
    Imports,
    Calls,
    Defines,
    Extends,
    Implements,
    References,
    BelongsTo,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::Defines => "DEFINES",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::References => "REFERENCES",
            RelationshipType::BelongsTo => "BELONGS_TO",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Option<String>,
    pub from_id: String,
    pub to_id: String,
    pub rel_type: String,
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    DependsOn,
    DependedOnBy,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalSpec {
    pub start_node: String,
    pub relationships: Vec<String>,
    pub depth: u8,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraversalResult {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyResult {
    pub direct: Vec<String>,
    pub transitive: Option<Vec<String>>,
    pub impact_score: f32,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub direct_impact_count: usize,
    pub transitive_impact_count: usize,
    pub impact_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathResult {
    pub path_exists: bool,
    pub path: Option<Vec<String>>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Packages,
    Modules,
    Files,
    Entities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureNode {
    pub name: String,
    pub r#type: String,
    pub path: String,
    pub children: Vec<ArchitectureNode>,
    pub metrics: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureResult {
    pub root: ArchitectureNode,
    pub inter_module_dependencies: Vec<Relationship>,
    pub metadata: QueryMetadata,
}

/// Cross-component contract (§6.6): every graph query response embeds this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub query_time_ms: u64,
    pub from_cache: bool,
    pub repositories_searched: Vec<String>,
    pub detail_level: Option<String>,
}

/// Reconstructs a placeholder node from just a label and a backend id, for
/// migration export paths that only surface opaque identity (§4.6). Carries
/// enough to preserve graph shape across a transfer; callers needing full
/// fidelity should re-ingest from source rather than rely on this shell.
pub fn shell_node(label: &str, id: &str) -> GraphNode {
    match label {
        "Repository" => GraphNode::Repository { name: id.to_string(), url: String::new(), last_indexed: None, status: "unknown".into() },
        "Module" => GraphNode::Module { name: id.to_string(), r#type: "unknown".into(), version: None },
        _ => GraphNode::Concept { name: id.to_string(), description: label.to_string(), confidence: 0.0 },
    }
}

/// `impact_score` must be monotonic in both inputs and stable across equal
/// inputs (§GLOSSARY); a simple saturating combination satisfies that.
pub fn impact_score(direct: usize, transitive: usize) -> f32 {
    let raw = direct as f32 + 0.5 * transitive as f32;
    1.0 - (-raw / 10.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_score_is_monotonic_and_bounded() {
        let a = impact_score(1, 0);
        let b = impact_score(5, 0);
        let c = impact_score(5, 10);
        assert!(a < b);
        assert!(b < c);
        assert!(c < 1.0);
        assert_eq!(impact_score(0, 0), 0.0);
    }

    #[test]
    fn node_labels_match_data_model() {
        let n = GraphNode::File {
            path: "src/lib.rs".into(),
            extension: Some("rs".into()),
            hash: "abc".into(),
            repository: "widgets".into(),
        };
        assert_eq!(n.labels(), vec!["File"]);
        assert_eq!(n.identity_keys().len(), 2);
    }

    #[test]
    fn public_id_survives_reparse_of_the_same_source() {
        let a = GraphNode::File { path: "a.rs".into(), extension: None, hash: "1".into(), repository: "r".into() };
        let b = GraphNode::File { path: "a.rs".into(), extension: None, hash: "2".into(), repository: "r".into() };
        assert_eq!(a.public_id(), b.public_id());
    }
}
