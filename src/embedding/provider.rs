/// Embedding provider abstraction (E1). Only the contract lives here — the
/// concrete OpenAI/local/Ollama implementations are external collaborators
/// and out of scope; callers supply any `Arc<dyn EmbeddingProvider>`.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Retryable;
use crate::util::backoff::{retry_with_backoff, BackoffPolicy};

/// Lowest common batch-size ceiling across providers.
pub const EMBEDDING_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding provider connection failed: {0}")]
    Connection(String),
    #[error("embedding provider returned an error status: {0}")]
    UpstreamStatus(u16),
    #[error("embedding provider returned {got} vectors for {expected} inputs")]
    ShortResponse { expected: usize, got: usize },
    #[error("no embedding provider is configured for this process")]
    NotConfigured,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Timeout(_)
                | EmbeddingError::Connection(_)
                | EmbeddingError::UpstreamStatus(429)
        ) || matches!(self, EmbeddingError::UpstreamStatus(status) if *status >= 500)
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single batch of texts (caller guarantees `texts.len() <=
    /// EMBEDDING_BATCH_SIZE`); returns one vector per input, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Splits `texts` into chunks of at most `EMBEDDING_BATCH_SIZE`, calls the
/// provider once per chunk (retrying transient failures), and concatenates
/// the results positionally. Errors on any chunk whose response is shorter
/// than the input batch.
pub async fn batched_embed(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    policy: &BackoffPolicy,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
        let timeout = provider.request_timeout();
        let result = retry_with_backoff(
            policy,
            |e: &EmbeddingError| e.is_retryable(),
            || async {
                tokio::time::timeout(timeout, provider.embed_batch(batch))
                    .await
                    .unwrap_or(Err(EmbeddingError::Timeout(timeout)))
            },
        )
        .await?;

        if result.len() < batch.len() {
            return Err(EmbeddingError::ShortResponse {
                expected: batch.len(),
                got: result.len(),
            });
        }
        embeddings.extend(result);
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.0_f32; 3]).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "test-model"
        }
    }

    #[tokio::test]
    async fn exactly_100_texts_uses_one_provider_call() {
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let texts: Vec<String> = (0..100).map(|i| format!("text-{i}")).collect();
        let embeddings = batched_embed(&provider, &texts, &BackoffPolicy::default()).await.unwrap();
        assert_eq!(embeddings.len(), 100);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hundred_and_one_texts_uses_two_provider_calls() {
        let provider = CountingProvider { calls: AtomicUsize::new(0) };
        let texts: Vec<String> = (0..101).map(|i| format!("text-{i}")).collect();
        let embeddings = batched_embed(&provider, &texts, &BackoffPolicy::default()).await.unwrap();
        assert_eq!(embeddings.len(), 101);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().take(texts.len().saturating_sub(1)).map(|_| vec![0.0; 3]).collect())
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn short_response_is_an_error() {
        let provider = ShortProvider;
        let texts = vec!["a".to_owned(), "b".to_owned()];
        let result = batched_embed(&provider, &texts, &BackoffPolicy::default()).await;
        assert!(matches!(result, Err(EmbeddingError::ShortResponse { expected: 2, got: 1 })));
    }
}
