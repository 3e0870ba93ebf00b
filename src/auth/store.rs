/// Token store persistence (C4b, §4.5/§6.1): a single JSON file at
/// `{DATA_PATH}/tokens.json`, written atomically via tmp-then-rename, the
/// same pattern the bg_poll debouncer's snapshot writer uses.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Retryable;

use super::token::StoredToken;

const STORE_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum TokenStorageError {
    #[error("failed to read token store: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write token store: {0}")]
    Write(#[source] std::io::Error),
    #[error("token store file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}

impl Retryable for TokenStorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, TokenStorageError::Write(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStoreFile {
    pub version: String,
    pub tokens: HashMap<String, StoredToken>,
}

impl Default for TokenStoreFile {
    fn default() -> Self {
        Self { version: STORE_VERSION.to_string(), tokens: HashMap::new() }
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_path: &Path) -> Self {
        Self { path: data_path.join("tokens.json") }
    }

    /// Missing file is not an error: it means an empty, valid store, and the
    /// empty store is written back so subsequent reads find it.
    pub fn load(&self) -> Result<TokenStoreFile, TokenStorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(TokenStorageError::Corrupt),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let empty = TokenStoreFile::default();
                self.save(&empty)?;
                Ok(empty)
            }
            Err(err) => Err(TokenStorageError::Read(err)),
        }
    }

    pub fn save(&self, file: &TokenStoreFile) -> Result<(), TokenStorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(TokenStorageError::Write)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(file).map_err(TokenStorageError::Corrupt)?;
        std::fs::write(&tmp_path, body).map_err(TokenStorageError::Write)?;
        if let Err(err) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(TokenStorageError::Write(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenMetadata;
    use chrono::Utc;

    fn sample_token() -> StoredToken {
        StoredToken {
            token_hash: "a".repeat(64),
            metadata: TokenMetadata {
                name: "ci".into(),
                created_at: Utc::now(),
                expires_at: None,
                scopes: vec!["read".into()],
                instance_access: vec!["private".into()],
                last_used_at: None,
                use_count: 0,
            },
            revoked: false,
            revoked_at: None,
        }
    }

    #[test]
    fn missing_file_loads_as_empty_and_then_persists_itself() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        let loaded = store.load().unwrap();
        assert!(loaded.tokens.is_empty());
        assert!(dir.path().join("tokens.json").exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        let mut file = TokenStoreFile::default();
        file.tokens.insert("a".repeat(64), sample_token());
        store.save(&file).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.tokens.len(), 1);
        assert_eq!(loaded.version, "1.0");
    }

    #[test]
    fn save_leaves_no_tmp_file_behind_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save(&TokenStoreFile::default()).unwrap();
        assert!(!dir.path().join("tokens.json.tmp").exists());
    }
}
