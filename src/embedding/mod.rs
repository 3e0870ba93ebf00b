pub mod provider;

pub use provider::{batched_embed, EmbeddingError, EmbeddingProvider, EMBEDDING_BATCH_SIZE};
