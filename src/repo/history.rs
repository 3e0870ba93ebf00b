use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateHistoryStatus {
    Success,
    Partial,
    Failed,
}

impl UpdateHistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateHistoryStatus::Success => "success",
            UpdateHistoryStatus::Partial => "partial",
            UpdateHistoryStatus::Failed => "failed",
        }
    }

    /// Derives the batch status from the error count, per the coordinator
    /// algorithm: any files processed with zero errors is `success`; some
    /// errors alongside at least one successful change is `partial`;
    /// everything failing is `failed`.
    pub fn derive(total_changes: usize, error_count: usize) -> Self {
        if error_count == 0 {
            UpdateHistoryStatus::Success
        } else if error_count < total_changes {
            UpdateHistoryStatus::Partial
        } else {
            UpdateHistoryStatus::Failed
        }
    }
}

/// Appended only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub previous_commit: Option<String>,
    pub new_commit: Option<String>,
    pub files_added: u64,
    pub files_modified: u64,
    pub files_deleted: u64,
    pub chunks_upserted: u64,
    pub chunks_deleted: u64,
    pub duration_ms: u64,
    pub error_count: u64,
    pub status: UpdateHistoryStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_boundaries() {
        assert_eq!(UpdateHistoryStatus::derive(5, 0), UpdateHistoryStatus::Success);
        assert_eq!(UpdateHistoryStatus::derive(5, 2), UpdateHistoryStatus::Partial);
        assert_eq!(UpdateHistoryStatus::derive(5, 5), UpdateHistoryStatus::Failed);
    }
}
