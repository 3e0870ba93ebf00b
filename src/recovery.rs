/// Interrupted-update detection & recovery (§4.8): a repository whose
/// `update_in_progress` flag is set but whose current process is no longer
/// running the update is recoverable, not permanently stuck.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::{CoordinatorError, UpdateCoordinator};
use crate::repo::{RepoStoreError, RepositoryInfo, RepositoryStatus, RepositoryStore};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoStoreError),
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}

#[derive(Debug, Clone, Serialize)]
pub struct InterruptedUpdate {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub last_indexed_sha: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InterruptedUpdates {
    pub interrupted: Vec<InterruptedUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    Resume,
    FullReindex,
    ManualRequired,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStrategy {
    pub kind: RecoveryKind,
    pub reason: String,
    pub can_auto_recover: bool,
    pub estimated_work: Option<String>,
}

/// Scans every repository for the interrupted-update marker (`update_in_progress
/// == true`). Detection is marker-based, not process-liveness-based: the
/// marker's mere presence after a crash is the signal (§4.2).
pub async fn detect_interrupted_updates(repo_store: &RepositoryStore) -> Result<InterruptedUpdates, RecoveryError> {
    let repos = repo_store.list().await?;
    let now = Utc::now();
    let interrupted = repos
        .into_iter()
        .filter(|info| info.update_in_progress)
        .map(|info| {
            let started_at = info.update_started_at.unwrap_or(now);
            InterruptedUpdate {
                name: info.name,
                started_at,
                elapsed_seconds: (now - started_at).num_seconds(),
                last_indexed_sha: info.last_indexed_commit_sha,
            }
        })
        .collect();
    Ok(InterruptedUpdates { interrupted })
}

/// Rule (§4.8): `last_indexed_sha` present and a local clone exists → resume;
/// present but clone missing → full reindex; neither → manual intervention.
pub fn evaluate_recovery_strategy(info: &RepositoryInfo) -> RecoveryStrategy {
    match (&info.last_indexed_commit_sha, &info.local_path) {
        (Some(_), Some(local_path)) if std::path::Path::new(local_path).is_dir() => RecoveryStrategy {
            kind: RecoveryKind::Resume,
            reason: "last indexed commit and local checkout are both present".to_owned(),
            can_auto_recover: true,
            estimated_work: Some("incremental diff from last indexed commit".to_owned()),
        },
        (Some(_), _) => RecoveryStrategy {
            kind: RecoveryKind::FullReindex,
            reason: "last indexed commit is known but the local checkout is missing".to_owned(),
            can_auto_recover: true,
            estimated_work: Some("full reindex of the repository".to_owned()),
        },
        (None, _) => RecoveryStrategy {
            kind: RecoveryKind::ManualRequired,
            reason: "no prior indexed commit; cannot determine a safe recovery action".to_owned(),
            can_auto_recover: false,
            estimated_work: None,
        },
    }
}

/// Dependencies an out-of-scope full-reindex command needs; injected so this
/// module stays free of a direct dependency on the scan/chunk/embed command
/// surface (which is a CLI concern, not a recovery one).
pub struct RecoveryDeps {
    pub repo_store: RepositoryStore,
    pub coordinator: Arc<UpdateCoordinator>,
    pub full_reindex: Arc<dyn Fn(String) -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync>,
}

pub async fn execute_recovery(
    info: &RepositoryInfo,
    strategy: &RecoveryStrategy,
    deps: &RecoveryDeps,
) -> Result<(), RecoveryError> {
    match strategy.kind {
        RecoveryKind::Resume => {
            deps.coordinator.update_repository(&info.name).await?;
            Ok(())
        }
        RecoveryKind::FullReindex => {
            if let Err(err) = (deps.full_reindex)(info.name.clone()).await {
                tracing::error!(repository = %info.name, %err, "full reindex recovery failed");
            }
            Ok(())
        }
        RecoveryKind::ManualRequired => {
            let mut cleared = info.clone();
            cleared.update_in_progress = false;
            cleared.update_started_at = None;
            cleared.status = RepositoryStatus::Error;
            deps.repo_store.upsert(&cleared).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> RepositoryInfo {
        RepositoryInfo::new("https://example.com/acme/widgets.git", "main", None)
    }

    #[test]
    fn missing_commit_requires_manual_recovery() {
        let info = sample_info();
        let strategy = evaluate_recovery_strategy(&info);
        assert_eq!(strategy.kind, RecoveryKind::ManualRequired);
        assert!(!strategy.can_auto_recover);
    }

    #[test]
    fn commit_present_but_clone_missing_is_full_reindex() {
        let mut info = sample_info();
        info.last_indexed_commit_sha = Some("abc123".to_owned());
        info.local_path = Some("/nonexistent/path/for/sure".to_owned());
        let strategy = evaluate_recovery_strategy(&info);
        assert_eq!(strategy.kind, RecoveryKind::FullReindex);
    }

    #[test]
    fn commit_and_local_clone_present_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = sample_info();
        info.last_indexed_commit_sha = Some("abc123".to_owned());
        info.local_path = Some(dir.path().to_string_lossy().into_owned());
        let strategy = evaluate_recovery_strategy(&info);
        assert_eq!(strategy.kind, RecoveryKind::Resume);
        assert!(strategy.can_auto_recover);
    }

    #[tokio::test]
    async fn detect_interrupted_updates_finds_only_marked_repos() {
        let db = crate::db::SqlDb::in_memory().await.unwrap();
        let repo_store = RepositoryStore::new(db);
        let info = sample_info();
        repo_store.create(&info).await.unwrap();
        repo_store.mark_update_started(&info.name).await.unwrap();

        let other = RepositoryInfo::new("https://example.com/acme/other.git", "main", None);
        repo_store.create(&other).await.unwrap();

        let found = detect_interrupted_updates(&repo_store).await.unwrap();
        assert_eq!(found.interrupted.len(), 1);
        assert_eq!(found.interrupted[0].name, info.name);
    }
}
