pub mod history;
pub mod store;
pub mod types;

pub use history::{UpdateHistoryEntry, UpdateHistoryStatus};
pub use store::{RepoStoreError, RepositoryStore};
pub use types::{RepositoryInfo, RepositoryStatus};
