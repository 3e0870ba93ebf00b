/// Shared helpers for the per-component error enums.
///
/// Each component (graph, auth, pipeline, migration) owns its own
/// `thiserror::Error` enum; this module only carries the couple of traits
/// and conversions that are genuinely shared across all of them, so that
/// retry loops and CLI reporting don't need to match on component-specific
/// variants.
use std::fmt;

/// Implemented by every component error enum so retry helpers and the
/// recovery module can ask "should I try this again?" without parsing
/// messages.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// A lightweight, serialisable error record used anywhere a batch of
/// per-item failures needs to be collected without aborting (C1 file
/// errors, C5 migration node/edge errors, G3 ingestion errors).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectedError {
    pub path: String,
    pub message: String,
}

impl CollectedError {
    pub fn new(path: impl Into<String>, err: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CollectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
