/// Graph ingestion (G3, §4.9): walks a repository checkout, extracts
/// File/Function entities with tree-sitter, and upserts them plus their
/// CONTAINS/DEFINES relationships into the graph backend.
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::chunking::languages::TSLanguageParsing;
use crate::chunking::types::{FunctionInformation, FunctionNodeType};
use crate::error::CollectedError;

use super::adapter::GraphAdapter;
use super::error::GraphError;
use super::types::{GraphNode, RelationshipType};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionResult {
    pub files_processed: usize,
    pub entities_created: usize,
    pub relationships_created: usize,
    pub errors: Vec<CollectedError>,
}

/// Ingests every source file under `local_path` belonging to a language the
/// tree-sitter configs understand; unrecognised extensions are skipped, not
/// errored, since the repository as a whole may be polyglot.
pub async fn ingest_repository(
    repository: &str,
    local_path: &Path,
    adapter: Arc<dyn GraphAdapter>,
) -> Result<IngestionResult, GraphError> {
    let parsing = TSLanguageParsing::init();
    let mut result = IngestionResult::default();

    adapter
        .upsert_node(GraphNode::Repository {
            name: repository.to_string(),
            url: String::new(),
            last_indexed: None,
            status: "indexing".into(),
        })
        .await?;

    for entry in WalkDir::new(local_path).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(local_path) {
            Ok(p) => p.to_string_lossy().to_string(),
            Err(_) => continue,
        };
        let extension = entry.path().extension().and_then(|e| e.to_str());
        let Some(language) = extension.and_then(language_for_extension) else { continue };

        let source = match std::fs::read_to_string(entry.path()) {
            Ok(s) => s,
            Err(err) => {
                result.errors.push(CollectedError::new(relative.clone(), err));
                continue;
            }
        };

        let file_node = GraphNode::File {
            path: relative.clone(),
            extension: extension.map(str::to_owned),
            hash: hash_source(&source),
            repository: repository.to_string(),
        };
        if let Err(err) = adapter.upsert_node(file_node.clone()).await {
            result.errors.push(CollectedError::new(relative.clone(), err));
            continue;
        }
        result.files_processed += 1;
        result.entities_created += 1;

        if let Err(err) = adapter
            .create_relationship(
                &GraphNode::Repository { name: repository.to_string(), url: String::new(), last_indexed: None, status: String::new() }.public_id(),
                &file_node.public_id(),
                RelationshipType::Contains.as_str(),
                Default::default(),
            )
            .await
        {
            result.errors.push(CollectedError::new(relative.clone(), err));
        } else {
            result.relationships_created += 1;
        }

        let Some(config) = parsing.for_lang(language) else { continue };
        let grammar = config.grammar;
        let mut parser = tree_sitter::Parser::new();
        if parser.set_language(grammar()).is_err() {
            continue;
        }
        let Some(tree) = parser.parse(source.as_bytes(), None) else { continue };
        let root = tree.root_node();

        let mut functions = Vec::new();
        for function_query in &config.function_query {
            let Ok(query) = tree_sitter::Query::new(grammar(), function_query) else { continue };
            let mut cursor = tree_sitter::QueryCursor::new();
            for m in cursor.captures(&query, root, source.as_bytes()) {
                for capture in m.0.captures {
                    let name = query.capture_names()[capture.index as usize].to_string();
                    if let Some(kind) = FunctionNodeType::from_str(&name) {
                        if matches!(kind, FunctionNodeType::Function) {
                            functions.push(FunctionInformation::new(capture.node, FunctionNodeType::Function));
                        }
                    }
                }
            }
        }

        for function in functions {
            let node = function.node();
            let name = identifier_text(node, &source).unwrap_or_else(|| "anonymous".to_string());
            let function_node = GraphNode::Function {
                name,
                signature: None,
                start_line: node.start_position().row,
                end_line: node.end_position().row,
                file_path: relative.clone(),
                repository: repository.to_string(),
            };
            if let Err(err) = adapter.upsert_node(function_node.clone()).await {
                result.errors.push(CollectedError::new(relative.clone(), err));
                continue;
            }
            result.entities_created += 1;

            if let Err(err) = adapter
                .create_relationship(&file_node.public_id(), &function_node.public_id(), RelationshipType::Defines.as_str(), Default::default())
                .await
            {
                result.errors.push(CollectedError::new(relative.clone(), err));
            } else {
                result.relationships_created += 1;
            }
        }
    }

    Ok(result)
}

fn language_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        _ => None,
    }
}

fn identifier_text(node: &tree_sitter::Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|n| source[n.start_byte()..n.end_byte()].to_string())
}

fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_for_extension_covers_the_tree_sitter_configs() {
        assert_eq!(language_for_extension("rs"), Some("rust"));
        assert_eq!(language_for_extension("tsx"), Some("typescript"));
        assert_eq!(language_for_extension("toml"), None);
    }

    #[test]
    fn hash_source_is_stable_and_content_sensitive() {
        assert_eq!(hash_source("fn main() {}"), hash_source("fn main() {}"));
        assert_ne!(hash_source("fn main() {}"), hash_source("fn other() {}"));
    }
}
