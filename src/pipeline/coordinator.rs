/// Update coordinator (P3, §4.2): drives diff → pipeline → history → status
/// flag. Per-repository writes are serialised through a lock keyed in an
/// `scc::HashMap`, the same concurrent-map idiom the background poller uses
/// for its `scc::HashMap<RepoRef, JoinHandle<_>>`.
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use scc::hash_map::Entry;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::chunking::languages::TSLanguageParsing;
use crate::embedding::EmbeddingProvider;
use crate::error::{CollectedError, Retryable};
use crate::git::{diff_commits, GitError};
use crate::repo::{RepoStoreError, RepositoryStatus, RepositoryStore, UpdateHistoryEntry, UpdateHistoryStatus};
use crate::vector::VectorClient;

use super::update::{process_changes, UpdateOptions, UpdateStats};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoStoreError),
    #[error("git diff failed: {0}")]
    Git(#[from] GitError),
    #[error("repository {0} is not in the ready state")]
    NotReady(String),
    #[error("repository {0} has no local checkout")]
    NoLocalPath(String),
}

impl Retryable for CoordinatorError {
    fn is_retryable(&self) -> bool {
        matches!(self, CoordinatorError::Git(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorStatus {
    NoChanges,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorResult {
    pub status: CoordinatorStatus,
    pub commit_sha: Option<String>,
    pub stats: UpdateStats,
    pub errors: Vec<CollectedError>,
    pub duration_ms: u64,
}

/// Per-repository write lock map; one coordinator instance should be shared
/// across all callers that update the same set of repositories for the
/// mutual exclusion to hold.
pub struct UpdateCoordinator {
    repo_store: RepositoryStore,
    locks: scc::HashMap<String, Arc<Mutex<()>>>,
    vector_client: Arc<VectorClient>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    parser: TSLanguageParsing,
    head_ref: String,
}

impl UpdateCoordinator {
    pub fn new(
        repo_store: RepositoryStore,
        vector_client: Arc<VectorClient>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            repo_store,
            locks: scc::HashMap::default(),
            vector_client,
            embedding_provider,
            parser: TSLanguageParsing::init(),
            head_ref: "HEAD".to_owned(),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        match self.locks.entry(name.to_owned()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(vacant) => {
                let lock = Arc::new(Mutex::new(()));
                vacant.insert_entry(lock.clone());
                lock
            }
        }
    }

    pub async fn update_repository(&self, name: &str) -> Result<CoordinatorResult, CoordinatorError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let started = std::time::Instant::now();

        let info = self.repo_store.require(name).await?;
        if info.status != RepositoryStatus::Ready {
            return Err(CoordinatorError::NotReady(name.to_owned()));
        }
        let Some(local_path) = info.local_path.clone() else {
            return Err(CoordinatorError::NoLocalPath(name.to_owned()));
        };

        self.repo_store.mark_update_started(name).await?;

        let diff_result = diff_commits(
            Path::new(&local_path),
            info.last_indexed_commit_sha.as_deref(),
            &self.head_ref,
        );

        let changes = match diff_result {
            Ok(changes) => changes,
            Err(err) => {
                self.repo_store.clear_update_marker(name).await?;
                return Err(CoordinatorError::Git(err));
            }
        };

        if changes.is_empty() {
            self.repo_store.clear_update_marker(name).await?;
            return Ok(CoordinatorResult {
                status: CoordinatorStatus::NoChanges,
                commit_sha: info.last_indexed_commit_sha.clone(),
                stats: UpdateStats::default(),
                errors: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let opts = UpdateOptions {
            repository: name.to_owned(),
            local_path: Path::new(&local_path).to_path_buf(),
            include_extensions: default_include_extensions(),
            exclude_patterns: default_exclude_patterns(),
        };

        let update_result = process_changes(
            &changes,
            &opts,
            &self.parser,
            &self.vector_client,
            self.embedding_provider.as_ref(),
        )
        .await;

        let new_commit = current_head_sha(Path::new(&local_path), &self.head_ref);
        let total_changes = changes.len();
        let history_entry = UpdateHistoryEntry {
            timestamp: Utc::now(),
            previous_commit: info.last_indexed_commit_sha.clone(),
            new_commit: new_commit.clone(),
            files_added: update_result.stats.files_added,
            files_modified: update_result.stats.files_modified,
            files_deleted: update_result.stats.files_deleted,
            chunks_upserted: update_result.stats.chunks_upserted,
            chunks_deleted: update_result.stats.chunks_deleted,
            duration_ms: started.elapsed().as_millis() as u64,
            error_count: update_result.errors.len() as u64,
            status: UpdateHistoryStatus::derive(total_changes, update_result.errors.len()),
        };
        self.repo_store.append_history(name, &history_entry).await?;

        let mut updated_info = info;
        updated_info.last_indexed_commit_sha = new_commit.clone().or(updated_info.last_indexed_commit_sha);
        updated_info.last_incremental_update_at = Some(Utc::now());
        updated_info.incremental_update_count += 1;
        updated_info.file_count += update_result.stats.files_added;
        updated_info.file_count = updated_info.file_count.saturating_sub(update_result.stats.files_deleted);
        updated_info.chunk_count += update_result.stats.chunks_upserted;
        updated_info.chunk_count = updated_info.chunk_count.saturating_sub(update_result.stats.chunks_deleted);
        updated_info.update_in_progress = false;
        updated_info.update_started_at = None;
        self.repo_store.upsert(&updated_info).await?;

        let status = if history_entry.status == UpdateHistoryStatus::Failed {
            CoordinatorStatus::Failed
        } else {
            CoordinatorStatus::Updated
        };

        Ok(CoordinatorResult {
            status,
            commit_sha: new_commit,
            stats: update_result.stats,
            errors: update_result.errors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn current_head_sha(repo_path: &Path, head_ref: &str) -> Option<String> {
    let repo = gix::open(repo_path).ok()?;
    let id = repo.rev_parse_single(head_ref).ok()?;
    Some(id.detach().to_string())
}

fn default_include_extensions() -> Vec<String> {
    vec![
        ".rs".into(),
        ".ts".into(),
        ".tsx".into(),
        ".js".into(),
        ".jsx".into(),
        ".py".into(),
    ]
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["node_modules/**".into(), "target/**".into(), "**/*.min.js".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_for_returns_the_same_mutex_for_repeated_calls() {
        let repo_store = RepositoryStore::new(crate::db::SqlDb::in_memory().await.unwrap());
        let coordinator = UpdateCoordinator::new(
            repo_store,
            Arc::new(test_vector_client()),
            Arc::new(NoopEmbedder),
        );
        let a = coordinator.lock_for("widgets");
        let b = coordinator.lock_for("widgets");
        assert!(Arc::ptr_eq(&a, &b));
    }

    struct NoopEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for NoopEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::embedding::EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "noop"
        }
    }

    fn test_vector_client() -> VectorClient {
        // Construction only exercises the lock map in this test; no network
        // call is made, so a client pointed at an unreachable URL is fine.
        let client = qdrant_client::prelude::QdrantClient::new(Some(
            qdrant_client::prelude::QdrantClientConfig::from_url("http://127.0.0.1:1"),
        ))
        .unwrap();
        VectorClient::new(client, "test-collection")
    }
}
