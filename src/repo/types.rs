use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Ready,
    Indexing,
    Error,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Ready => "ready",
            RepositoryStatus::Indexing => "indexing",
            RepositoryStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "indexing" => RepositoryStatus::Indexing,
            "error" => RepositoryStatus::Error,
            _ => RepositoryStatus::Ready,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub url: String,
    pub branch: String,
    pub status: RepositoryStatus,
    pub file_count: u64,
    pub chunk_count: u64,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_indexed_commit_sha: Option<String>,
    pub last_incremental_update_at: Option<DateTime<Utc>>,
    pub incremental_update_count: u64,
    pub index_duration_ms: u64,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<u32>,
    pub local_path: Option<String>,
    pub update_in_progress: bool,
    pub update_started_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl RepositoryInfo {
    /// `name` is derived from the URL and must be unique; this mirrors the
    /// last non-empty path segment of the repo URL.
    pub fn derive_name(url: &str) -> String {
        url.trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .to_owned()
    }

    pub fn new(url: &str, branch: impl Into<String>, local_path: Option<String>) -> Self {
        Self {
            name: Self::derive_name(url),
            url: url.to_owned(),
            branch: branch.into(),
            status: RepositoryStatus::Ready,
            file_count: 0,
            chunk_count: 0,
            last_indexed_at: None,
            last_indexed_commit_sha: None,
            last_incremental_update_at: None,
            incremental_update_count: 0,
            index_duration_ms: 0,
            embedding_provider: None,
            embedding_model: None,
            embedding_dimensions: None,
            local_path,
            update_in_progress: false,
            update_started_at: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_from_url() {
        assert_eq!(RepositoryInfo::derive_name("https://github.com/acme/widgets.git"), "widgets");
        assert_eq!(RepositoryInfo::derive_name("https://github.com/acme/widgets"), "widgets");
        assert_eq!(RepositoryInfo::derive_name("https://github.com/acme/widgets/"), "widgets");
    }
}
