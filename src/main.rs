use std::sync::Arc;

use clap::Parser;
use codegraph_sidecar::application::{Application, Configuration};
use codegraph_sidecar::cli::{self, Cli};
use codegraph_sidecar::embedding::EmbeddingProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Configuration::parse();

    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::new(UnconfiguredEmbeddingProvider);
    let app = Application::initialize(config, embedding_provider).await?;

    let exit_code = cli::run(&app, cli).await?;
    std::process::exit(exit_code);
}

/// Placeholder embedding provider wired in at startup until a concrete
/// implementation (OpenAI/local/Ollama) is selected by deployment
/// configuration; those implementations are an external collaborator.
struct UnconfiguredEmbeddingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for UnconfiguredEmbeddingProvider {
    async fn embed_batch(
        &self,
        _texts: &[String],
    ) -> Result<Vec<Vec<f32>>, codegraph_sidecar::embedding::EmbeddingError> {
        Err(codegraph_sidecar::embedding::EmbeddingError::NotConfigured)
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }
}
