use thiserror::Error;

use crate::error::Retryable;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("backend operation error: {message}")]
    Operation { message: String, retryable: bool },
}

impl Retryable for GraphError {
    fn is_retryable(&self) -> bool {
        match self {
            GraphError::Connection(_) => true,
            GraphError::Timeout { .. } => true,
            GraphError::Operation { retryable, .. } => *retryable,
            GraphError::Validation(_) | GraphError::EntityNotFound(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphServiceError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("entity not found: {0}")]
    EntityNotFound(String),
    #[error("invalid query arguments: {0}")]
    Validation(String),
    #[error("query timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl Retryable for GraphServiceError {
    fn is_retryable(&self) -> bool {
        match self {
            GraphServiceError::Graph(e) => e.is_retryable(),
            GraphServiceError::Timeout { .. } => true,
            GraphServiceError::EntityNotFound(_) | GraphServiceError::Validation(_) => false,
        }
    }
}
