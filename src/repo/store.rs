/// Repository metadata store (R1): durable `RepositoryInfo` plus an
/// append-only update-history ledger, backed by the shared `SqlDb` pool.
use chrono::Utc;
use sqlx::Row;
use thiserror::Error;

use crate::db::SqlDb;

use super::history::{UpdateHistoryEntry, UpdateHistoryStatus};
use super::types::{RepositoryInfo, RepositoryStatus};

#[derive(Debug, Error)]
pub enum RepoStoreError {
    #[error("repository {0} not found")]
    NotFound(String),
    #[error("repository {0} already exists")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct RepositoryStore {
    db: SqlDb,
}

impl RepositoryStore {
    pub fn new(db: SqlDb) -> Self {
        Self { db }
    }

    pub async fn create(&self, info: &RepositoryInfo) -> Result<(), RepoStoreError> {
        if self.get(&info.name).await?.is_some() {
            return Err(RepoStoreError::AlreadyExists(info.name.clone()));
        }
        self.upsert(info).await
    }

    pub async fn upsert(&self, info: &RepositoryInfo) -> Result<(), RepoStoreError> {
        sqlx::query(
            "INSERT INTO repositories (
                name, url, branch, status, file_count, chunk_count,
                last_indexed_at, last_indexed_commit_sha, last_incremental_update_at,
                incremental_update_count, index_duration_ms, embedding_provider,
                embedding_model, embedding_dimensions, local_path, update_in_progress,
                update_started_at, error_message
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(name) DO UPDATE SET
                url=excluded.url, branch=excluded.branch, status=excluded.status,
                file_count=excluded.file_count, chunk_count=excluded.chunk_count,
                last_indexed_at=excluded.last_indexed_at,
                last_indexed_commit_sha=excluded.last_indexed_commit_sha,
                last_incremental_update_at=excluded.last_incremental_update_at,
                incremental_update_count=excluded.incremental_update_count,
                index_duration_ms=excluded.index_duration_ms,
                embedding_provider=excluded.embedding_provider,
                embedding_model=excluded.embedding_model,
                embedding_dimensions=excluded.embedding_dimensions,
                local_path=excluded.local_path,
                update_in_progress=excluded.update_in_progress,
                update_started_at=excluded.update_started_at,
                error_message=excluded.error_message",
        )
        .bind(&info.name)
        .bind(&info.url)
        .bind(&info.branch)
        .bind(info.status.as_str())
        .bind(info.file_count as i64)
        .bind(info.chunk_count as i64)
        .bind(info.last_indexed_at.map(|t| t.to_rfc3339()))
        .bind(&info.last_indexed_commit_sha)
        .bind(info.last_incremental_update_at.map(|t| t.to_rfc3339()))
        .bind(info.incremental_update_count as i64)
        .bind(info.index_duration_ms as i64)
        .bind(&info.embedding_provider)
        .bind(&info.embedding_model)
        .bind(info.embedding_dimensions.map(|d| d as i64))
        .bind(&info.local_path)
        .bind(info.update_in_progress as i64)
        .bind(info.update_started_at.map(|t| t.to_rfc3339()))
        .bind(&info.error_message)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<RepositoryInfo>, RepoStoreError> {
        let row = sqlx::query("SELECT * FROM repositories WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|row| row_to_info(&row)))
    }

    pub async fn require(&self, name: &str) -> Result<RepositoryInfo, RepoStoreError> {
        self.get(name).await?.ok_or_else(|| RepoStoreError::NotFound(name.to_owned()))
    }

    pub async fn list(&self) -> Result<Vec<RepositoryInfo>, RepoStoreError> {
        let rows = sqlx::query("SELECT * FROM repositories ORDER BY name").fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(row_to_info).collect())
    }

    pub async fn delete(&self, name: &str) -> Result<(), RepoStoreError> {
        sqlx::query("DELETE FROM update_history WHERE repository_name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await?;
        sqlx::query("DELETE FROM repositories WHERE name = ?").bind(name).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Sets `updateInProgress = true` and persists — the interrupted-update
    /// marker described by the coordinator's algorithm.
    pub async fn mark_update_started(&self, name: &str) -> Result<(), RepoStoreError> {
        let mut info = self.require(name).await?;
        info.update_in_progress = true;
        info.update_started_at = Some(Utc::now());
        self.upsert(&info).await
    }

    pub async fn clear_update_marker(&self, name: &str) -> Result<(), RepoStoreError> {
        let mut info = self.require(name).await?;
        info.update_in_progress = false;
        info.update_started_at = None;
        self.upsert(&info).await
    }

    pub async fn append_history(
        &self,
        repository_name: &str,
        entry: &UpdateHistoryEntry,
    ) -> Result<(), RepoStoreError> {
        sqlx::query(
            "INSERT INTO update_history (
                repository_name, timestamp, previous_commit, new_commit,
                files_added, files_modified, files_deleted, chunks_upserted,
                chunks_deleted, duration_ms, error_count, status
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(repository_name)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.previous_commit)
        .bind(&entry.new_commit)
        .bind(entry.files_added as i64)
        .bind(entry.files_modified as i64)
        .bind(entry.files_deleted as i64)
        .bind(entry.chunks_upserted as i64)
        .bind(entry.chunks_deleted as i64)
        .bind(entry.duration_ms as i64)
        .bind(entry.error_count as i64)
        .bind(entry.status.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn history_for(&self, repository_name: &str) -> Result<Vec<UpdateHistoryEntry>, RepoStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM update_history WHERE repository_name = ? ORDER BY id ASC",
        )
        .bind(repository_name)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(row_to_history_entry).collect())
    }
}

fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> RepositoryInfo {
    RepositoryInfo {
        name: row.get("name"),
        url: row.get("url"),
        branch: row.get("branch"),
        status: RepositoryStatus::parse(&row.get::<String, _>("status")),
        file_count: row.get::<i64, _>("file_count") as u64,
        chunk_count: row.get::<i64, _>("chunk_count") as u64,
        last_indexed_at: parse_optional_dt(row.get("last_indexed_at")),
        last_indexed_commit_sha: row.get("last_indexed_commit_sha"),
        last_incremental_update_at: parse_optional_dt(row.get("last_incremental_update_at")),
        incremental_update_count: row.get::<i64, _>("incremental_update_count") as u64,
        index_duration_ms: row.get::<i64, _>("index_duration_ms") as u64,
        embedding_provider: row.get("embedding_provider"),
        embedding_model: row.get("embedding_model"),
        embedding_dimensions: row.get::<Option<i64>, _>("embedding_dimensions").map(|d| d as u32),
        local_path: row.get("local_path"),
        update_in_progress: row.get::<i64, _>("update_in_progress") != 0,
        update_started_at: parse_optional_dt(row.get("update_started_at")),
        error_message: row.get("error_message"),
    }
}

fn row_to_history_entry(row: &sqlx::sqlite::SqliteRow) -> UpdateHistoryEntry {
    let status = match row.get::<String, _>("status").as_str() {
        "partial" => UpdateHistoryStatus::Partial,
        "failed" => UpdateHistoryStatus::Failed,
        _ => UpdateHistoryStatus::Success,
    };
    UpdateHistoryEntry {
        timestamp: parse_optional_dt(row.get("timestamp")).unwrap_or_else(Utc::now),
        previous_commit: row.get("previous_commit"),
        new_commit: row.get("new_commit"),
        files_added: row.get::<i64, _>("files_added") as u64,
        files_modified: row.get::<i64, _>("files_modified") as u64,
        files_deleted: row.get::<i64, _>("files_deleted") as u64,
        chunks_upserted: row.get::<i64, _>("chunks_upserted") as u64,
        chunks_deleted: row.get::<i64, _>("chunks_deleted") as u64,
        duration_ms: row.get::<i64, _>("duration_ms") as u64,
        error_count: row.get::<i64, _>("error_count") as u64,
        status,
    }
}

fn parse_optional_dt(raw: Option<String>) -> Option<chrono::DateTime<Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> RepositoryStore {
        RepositoryStore::new(SqlDb::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        let info = RepositoryInfo::new("https://example.com/acme/widgets.git", "main", None);
        store.create(&info).await.unwrap();
        let fetched = store.get("widgets").await.unwrap().unwrap();
        assert_eq!(fetched.name, "widgets");
        assert_eq!(fetched.status, RepositoryStatus::Ready);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = store().await;
        let info = RepositoryInfo::new("https://example.com/acme/widgets.git", "main", None);
        store.create(&info).await.unwrap();
        let err = store.create(&info).await.unwrap_err();
        assert!(matches!(err, RepoStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_marker_lifecycle() {
        let store = store().await;
        let info = RepositoryInfo::new("https://example.com/acme/widgets.git", "main", None);
        store.create(&info).await.unwrap();
        store.mark_update_started("widgets").await.unwrap();
        let marked = store.get("widgets").await.unwrap().unwrap();
        assert!(marked.update_in_progress);
        assert!(marked.update_started_at.is_some());

        store.clear_update_marker("widgets").await.unwrap();
        let cleared = store.get("widgets").await.unwrap().unwrap();
        assert!(!cleared.update_in_progress);
        assert!(cleared.update_started_at.is_none());
    }

    #[tokio::test]
    async fn history_append_is_ordered_and_readable() {
        let store = store().await;
        let info = RepositoryInfo::new("https://example.com/acme/widgets.git", "main", None);
        store.create(&info).await.unwrap();

        for i in 0..3 {
            let entry = UpdateHistoryEntry {
                timestamp: Utc::now(),
                previous_commit: Some(format!("sha-{i}")),
                new_commit: Some(format!("sha-{}", i + 1)),
                files_added: 1,
                files_modified: 0,
                files_deleted: 0,
                chunks_upserted: 1,
                chunks_deleted: 0,
                duration_ms: 5,
                error_count: 0,
                status: UpdateHistoryStatus::Success,
            };
            store.append_history("widgets", &entry).await.unwrap();
        }

        let history = store.history_for("widgets").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].previous_commit.as_deref(), Some("sha-0"));
        assert_eq!(history[2].new_commit.as_deref(), Some("sha-3"));
    }
}
