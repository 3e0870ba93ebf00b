/// Bearer-token lifecycle (C4, §4.5): generate/validate/revoke/rotate,
/// backed by an in-memory `scc::HashMap` cache with the on-disk file as the
/// durable source of truth — the same single-writer, many-reader idiom the
/// pack's background poller uses for its task-handle map.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::Retryable;

use super::store::{TokenStorageError, TokenStore, TokenStoreFile};

const TOKEN_PREFIX: &str = "pk_mcp_";
const MAX_EXPIRES_IN_SECONDS: u64 = 31_536_000;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\s\-_.]{1,100}$").unwrap());
static RAW_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^pk_mcp_[0-9a-f]{32}$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub instance_access: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token_hash: String,
    pub metadata: TokenMetadata,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct GenerateTokenParams {
    pub name: String,
    pub scopes: Vec<String>,
    pub instance_access: Vec<String>,
    pub expires_in_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct GeneratedToken {
    pub raw_token: String,
    pub token_hash: String,
    pub metadata: TokenMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid,
    NotFound,
    Revoked,
    Expired,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token parameters: {0}")]
    Validation(String),
    #[error("token storage error: {0}")]
    Storage(#[from] TokenStorageError),
    #[error("token hash {0} not found")]
    NotFound(String),
}

impl Retryable for TokenError {
    fn is_retryable(&self) -> bool {
        matches!(self, TokenError::Storage(e) if e.is_retryable())
    }
}

pub struct TokenService {
    store: TokenStore,
    cache: scc::HashMap<String, StoredToken>,
}

impl TokenService {
    pub fn with_store_path(data_path: &std::path::Path) -> Result<Self, TokenError> {
        let store = TokenStore::new(data_path);
        let file = store.load()?;
        let cache: scc::HashMap<String, StoredToken> = scc::HashMap::default();
        for (hash, token) in file.tokens {
            let _ = cache.insert(hash, token);
        }
        Ok(Self { store, cache })
    }

    pub fn generate_token(&self, params: GenerateTokenParams) -> Result<GeneratedToken, TokenError> {
        validate_name(&params.name)?;
        validate_scopes(&params.scopes)?;
        validate_instance_access(&params.instance_access)?;
        let expires_at = validate_expiry(params.expires_in_seconds)?;

        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let metadata = TokenMetadata {
            name: params.name,
            created_at: Utc::now(),
            expires_at,
            scopes: params.scopes,
            instance_access: params.instance_access,
            last_used_at: None,
            use_count: 0,
        };
        let stored = StoredToken { token_hash: token_hash.clone(), metadata: metadata.clone(), revoked: false, revoked_at: None };

        let _ = self.cache.insert(token_hash.clone(), stored);
        self.persist()?;

        Ok(GeneratedToken { raw_token, token_hash, metadata })
    }

    /// Hot path (§4.5 target <10ms): format check, hash, cache lookup, then
    /// a fire-and-forget usage-stat bump that may lose a concurrent
    /// increment — an accepted, documented race. Spawned on the current
    /// Tokio runtime when one is running; falls back to an inline bump
    /// when called outside a runtime (e.g. synchronous tests).
    pub fn validate_token(self: &Arc<Self>, raw_token: &str) -> (ValidationOutcome, Option<TokenMetadata>) {
        if !RAW_TOKEN_PATTERN.is_match(raw_token) {
            return (ValidationOutcome::Invalid, None);
        }
        let hash = hash_token(raw_token);
        let stored = match self.cache.entry(hash.clone()) {
            scc::hash_map::Entry::Occupied(entry) => entry.get().clone(),
            scc::hash_map::Entry::Vacant(_) => return (ValidationOutcome::NotFound, None),
        };

        if stored.revoked {
            return (ValidationOutcome::Revoked, Some(stored.metadata));
        }
        if let Some(expires_at) = stored.metadata.expires_at {
            if expires_at < Utc::now() {
                return (ValidationOutcome::Expired, Some(stored.metadata));
            }
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let this = Arc::clone(self);
            let hash_for_task = hash.clone();
            handle.spawn(async move {
                if let Err(err) = this.bump_usage(&hash_for_task) {
                    tracing::warn!(error = %err, "failed to persist token usage bump");
                }
            });
        } else if let Err(err) = self.bump_usage(&hash) {
            tracing::warn!(error = %err, "failed to persist token usage bump");
        }

        (ValidationOutcome::Valid, Some(stored.metadata))
    }

    fn bump_usage(&self, hash: &str) -> Result<(), TokenError> {
        if let scc::hash_map::Entry::Occupied(mut entry) = self.cache.entry(hash.to_owned()) {
            entry.get_mut().metadata.use_count += 1;
            entry.get_mut().metadata.last_used_at = Some(Utc::now());
        }
        self.persist()
    }

    pub fn revoke_token(&self, hash: &str) -> Result<bool, TokenError> {
        let revoked = match self.cache.entry(hash.to_owned()) {
            scc::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().revoked = true;
                entry.get_mut().revoked_at = Some(Utc::now());
                true
            }
            scc::hash_map::Entry::Vacant(_) => false,
        };
        if revoked {
            self.persist()?;
        }
        Ok(revoked)
    }

    pub fn delete_token(&self, hash: &str) -> Result<bool, TokenError> {
        let removed = self.cache.remove(hash).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Revokes `hash` and mints a fresh token inheriting its metadata (name
    /// suffixed), persisting both changes in one write.
    pub fn rotate_token(&self, hash: &str) -> Result<GeneratedToken, TokenError> {
        let old = match self.cache.entry(hash.to_owned()) {
            scc::hash_map::Entry::Occupied(mut entry) => {
                let snapshot = entry.get().clone();
                entry.get_mut().revoked = true;
                entry.get_mut().revoked_at = Some(Utc::now());
                snapshot
            }
            scc::hash_map::Entry::Vacant(_) => return Err(TokenError::NotFound(hash.to_string())),
        };

        let raw_token = generate_raw_token();
        let new_hash = hash_token(&raw_token);
        let metadata = TokenMetadata {
            name: format!("{}-rotated", old.metadata.name),
            created_at: Utc::now(),
            expires_at: old.metadata.expires_at,
            scopes: old.metadata.scopes.clone(),
            instance_access: old.metadata.instance_access.clone(),
            last_used_at: None,
            use_count: 0,
        };
        let stored = StoredToken { token_hash: new_hash.clone(), metadata: metadata.clone(), revoked: false, revoked_at: None };
        let _ = self.cache.insert(new_hash.clone(), stored);
        self.persist()?;

        Ok(GeneratedToken { raw_token, token_hash: new_hash, metadata })
    }

    pub fn find_by_name(&self, name: &str) -> Option<StoredToken> {
        let mut found = None;
        self.cache.retain(|_, token| {
            if found.is_none()
                && token.metadata.name == name
                && !token.revoked
                && token.metadata.expires_at.map(|e| e >= Utc::now()).unwrap_or(true)
            {
                found = Some(token.clone());
            }
            true
        });
        found
    }

    pub fn find_by_hash_prefix(&self, prefix: &str) -> Vec<StoredToken> {
        let prefix_lower = prefix.to_lowercase();
        let mut matches = Vec::new();
        self.cache.retain(|hash, token| {
            if hash.to_lowercase().starts_with(&prefix_lower) {
                matches.push(token.clone());
            }
            true
        });
        matches
    }

    pub fn list(&self) -> Vec<StoredToken> {
        let mut tokens = Vec::new();
        self.cache.retain(|_, token| {
            tokens.push(token.clone());
            true
        });
        tokens
    }

    fn persist(&self) -> Result<(), TokenError> {
        let mut tokens = std::collections::HashMap::new();
        self.cache.retain(|hash, token| {
            tokens.insert(hash.clone(), token.clone());
            true
        });
        self.store.save(&TokenStoreFile { version: "1.0".to_string(), tokens })?;
        Ok(())
    }
}

fn generate_raw_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

fn validate_name(name: &str) -> Result<(), TokenError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(TokenError::Validation(format!("token name '{name}' must match {}", NAME_PATTERN.as_str())))
    }
}

fn validate_scopes(scopes: &[String]) -> Result<(), TokenError> {
    if scopes.is_empty() || !scopes.iter().all(|s| matches!(s.as_str(), "read" | "write" | "admin")) {
        return Err(TokenError::Validation("scopes must be a non-empty subset of read/write/admin".into()));
    }
    Ok(())
}

fn validate_instance_access(values: &[String]) -> Result<(), TokenError> {
    if values.is_empty() || !values.iter().all(|v| matches!(v.as_str(), "private" | "work" | "public")) {
        return Err(TokenError::Validation("instanceAccess must be a non-empty subset of private/work/public".into()));
    }
    Ok(())
}

fn validate_expiry(expires_in_seconds: Option<u64>) -> Result<Option<DateTime<Utc>>, TokenError> {
    match expires_in_seconds {
        None => Ok(None),
        Some(0) => Err(TokenError::Validation("expiresInSeconds must be > 0 when present".into())),
        Some(s) if s > MAX_EXPIRES_IN_SECONDS => {
            Err(TokenError::Validation(format!("expiresInSeconds must be <= {MAX_EXPIRES_IN_SECONDS}")))
        }
        Some(s) => Ok(Some(Utc::now() + chrono::Duration::seconds(s as i64))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Arc<TokenService> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(TokenService::with_store_path(dir.path()).unwrap())
    }

    fn params(name: &str) -> GenerateTokenParams {
        GenerateTokenParams {
            name: name.to_string(),
            scopes: vec!["read".into()],
            instance_access: vec!["private".into()],
            expires_in_seconds: None,
        }
    }

    #[test]
    fn generated_hash_matches_sha256_of_raw_token() {
        let service = service();
        let generated = service.generate_token(params("ci")).unwrap();
        assert_eq!(generated.token_hash, hash_token(&generated.raw_token));
        assert_eq!(generated.token_hash.len(), 64);
    }

    #[test]
    fn repeated_generation_yields_distinct_tokens() {
        let service = service();
        let a = service.generate_token(params("ci")).unwrap();
        let b = service.generate_token(params("ci")).unwrap();
        assert_ne!(a.raw_token, b.raw_token);
        assert_ne!(a.token_hash, b.token_hash);
    }

    #[test]
    fn validate_token_cold_cache_is_not_found() {
        let service = service();
        let (outcome, _) = service.validate_token(&format!("pk_mcp_{}", "0".repeat(32)));
        assert_eq!(outcome, ValidationOutcome::NotFound);
    }

    #[test]
    fn validate_then_revoke_flow() {
        let service = service();
        let generated = service.generate_token(params("ci")).unwrap();
        let (outcome, _) = service.validate_token(&generated.raw_token);
        assert_eq!(outcome, ValidationOutcome::Valid);

        assert!(service.revoke_token(&generated.token_hash).unwrap());
        let (outcome, _) = service.validate_token(&generated.raw_token);
        assert_eq!(outcome, ValidationOutcome::Revoked);
    }

    #[test]
    fn rotate_revokes_old_and_mints_new() {
        let service = service();
        let original = service.generate_token(params("ci")).unwrap();
        let rotated = service.rotate_token(&original.token_hash).unwrap();

        assert_ne!(rotated.token_hash, original.token_hash);
        let (old_outcome, _) = service.validate_token(&original.raw_token);
        assert_eq!(old_outcome, ValidationOutcome::Revoked);
        let (new_outcome, _) = service.validate_token(&rotated.raw_token);
        assert_eq!(new_outcome, ValidationOutcome::Valid);
    }

    #[test]
    fn empty_scopes_are_rejected() {
        let service = service();
        let mut p = params("ci");
        p.scopes = vec![];
        assert!(service.generate_token(p).is_err());
    }

    #[test]
    fn find_by_hash_prefix_is_case_insensitive() {
        let service = service();
        let generated = service.generate_token(params("ci")).unwrap();
        let prefix = generated.token_hash[..8].to_uppercase();
        let matches = service.find_by_hash_prefix(&prefix);
        assert_eq!(matches.len(), 1);
    }
}
