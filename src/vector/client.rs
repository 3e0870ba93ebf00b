/// Vector storage client (V1): upsert/delete by filter into qdrant, the
/// same client crate the indexing cache already depends on.
use chrono::{DateTime, Utc};
use qdrant_client::prelude::{Payload, QdrantClient};
use qdrant_client::qdrant::{
    Condition, Filter, PointId, PointStruct, PointsIdsList, PointsSelector,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::Retryable;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("qdrant transport error: {0}")]
    Connection(String),
    #[error("qdrant reported an operation error: {0}")]
    Operation(String),
}

impl Retryable for VectorError {
    fn is_retryable(&self) -> bool {
        matches!(self, VectorError::Connection(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    pub file_path: String,
    pub repository: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_start_line: usize,
    pub chunk_end_line: usize,
    pub file_extension: Option<String>,
    pub file_size_bytes: u64,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
    pub file_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

pub struct VectorClient {
    client: QdrantClient,
    collection_name: String,
}

impl VectorClient {
    pub fn new(client: QdrantClient, collection_name: impl Into<String>) -> Self {
        Self {
            client,
            collection_name: collection_name.into(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Upserts all documents in a single call; documents sharing an `id`
    /// with an existing point replace it.
    pub async fn upsert(&self, documents: Vec<DocumentInput>) -> Result<(), VectorError> {
        if documents.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = documents
            .into_iter()
            .map(|doc| {
                let mut payload = payload_map(&doc.metadata);
                payload.insert("content".to_owned(), doc.content.into());
                PointStruct {
                    id: Some(PointId::from(doc.id)),
                    vectors: Some(doc.embedding.into()),
                    payload: Payload::new_from_hashmap(payload).into(),
                }
            })
            .collect();

        self.client
            .upsert_points(&self.collection_name, points, None)
            .await
            .map_err(|e| VectorError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Deletes every stored chunk whose payload matches
    /// `(repository, file_path)`, regardless of chunk count or index.
    pub async fn delete_by_file(&self, repository: &str, file_path: &str) -> Result<(), VectorError> {
        let filter = Filter::must([
            Condition::matches("repository", repository.to_string()),
            Condition::matches("file_path", file_path.to_string()),
        ]);
        self.client
            .delete_points(&self.collection_name, &PointsSelector::from(filter), None)
            .await
            .map_err(|e| VectorError::Operation(e.to_string()))?;
        Ok(())
    }

    pub async fn delete_by_ids(&self, ids: Vec<String>) -> Result<(), VectorError> {
        if ids.is_empty() {
            return Ok(());
        }
        let selector = PointsSelector::from(PointsIdsList {
            ids: ids.into_iter().map(PointId::from).collect(),
        });
        self.client
            .delete_points(&self.collection_name, &selector, None)
            .await
            .map_err(|e| VectorError::Operation(e.to_string()))?;
        Ok(())
    }
}

fn payload_map(metadata: &DocumentMetadata) -> std::collections::HashMap<String, qdrant_client::qdrant::Value> {
    let mut map = std::collections::HashMap::new();
    map.insert("file_path".to_owned(), metadata.file_path.clone().into());
    map.insert("repository".to_owned(), metadata.repository.clone().into());
    map.insert("chunk_index".to_owned(), (metadata.chunk_index as i64).into());
    map.insert("total_chunks".to_owned(), (metadata.total_chunks as i64).into());
    map.insert("chunk_start_line".to_owned(), (metadata.chunk_start_line as i64).into());
    map.insert("chunk_end_line".to_owned(), (metadata.chunk_end_line as i64).into());
    if let Some(ext) = &metadata.file_extension {
        map.insert("file_extension".to_owned(), ext.clone().into());
    }
    map.insert("file_size_bytes".to_owned(), (metadata.file_size_bytes as i64).into());
    map.insert("content_hash".to_owned(), metadata.content_hash.clone().into());
    map.insert("indexed_at".to_owned(), metadata.indexed_at.to_rfc3339().into());
    if let Some(modified) = metadata.file_modified_at {
        map.insert("file_modified_at".to_owned(), modified.to_rfc3339().into());
    }
    map
}
