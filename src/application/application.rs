/// The composition root (§3.10): owns the repository metadata store (R1),
/// the token service (A1), the graph adapter and query service (G1/G2), the
/// vector client (V1), the embedding provider (E1), and the metrics
/// collector (S1). `Clone` is cheap — every field is `Arc`-backed or itself
/// a pool handle — so the application can be handed to spawned tasks
/// without lifetime gymnastics.
use std::sync::Arc;

use qdrant_client::prelude::{QdrantClient, QdrantClientConfig};

use crate::auth::TokenService;
use crate::db::SqlDb;
use crate::embedding::EmbeddingProvider;
use crate::graph::adapter::{create_graph_adapter, AdapterConfig, AdapterType, GraphAdapter};
use crate::graph::query_service::GraphQueryService;
use crate::metrics::MetricsCollector;
use crate::pipeline::UpdateCoordinator;
use crate::repo::RepositoryStore;
use crate::vector::VectorClient;

use super::config::Configuration;
use super::logging::install_logging;

const METRICS_RING_CAPACITY: usize = 100;
const DEFAULT_VECTOR_COLLECTION: &str = "codegraph";

#[derive(Clone)]
pub struct Application {
    pub config: Configuration,
    pub db: SqlDb,
    pub repo_store: RepositoryStore,
    pub token_service: Arc<TokenService>,
    pub graph_adapter: Arc<dyn GraphAdapter>,
    pub graph_query_service: Arc<GraphQueryService>,
    pub vector_client: Arc<VectorClient>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub metrics: Arc<MetricsCollector>,
    pub coordinator: Arc<UpdateCoordinator>,
}

impl Application {
    /// Constructs every owned collaborator and installs logging once. The
    /// embedding provider implementation is an external collaborator
    /// (Non-goal) and is supplied by the caller rather than constructed
    /// here.
    pub async fn initialize(
        config: Configuration,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        install_logging(&config);

        let db = SqlDb::new(&config.data_path).await?;
        let repo_store = RepositoryStore::new(db.clone());
        let token_service = Arc::new(TokenService::with_store_path(&config.data_path)?);

        let graph_adapter = create_graph_adapter(config.graph_backend, graph_adapter_config(&config));
        let metrics = Arc::new(MetricsCollector::new(METRICS_RING_CAPACITY));
        let graph_query_service = Arc::new(GraphQueryService::new(graph_adapter.clone(), metrics.clone()));

        let vector_client = Arc::new(VectorClient::new(vector_client_handle(&config)?, DEFAULT_VECTOR_COLLECTION));

        let coordinator = Arc::new(UpdateCoordinator::new(
            repo_store.clone(),
            vector_client.clone(),
            embedding_provider.clone(),
        ));

        Ok(Self {
            config,
            db,
            repo_store,
            token_service,
            graph_adapter,
            graph_query_service,
            vector_client,
            embedding_provider,
            metrics,
            coordinator,
        })
    }
}

fn graph_adapter_config(config: &Configuration) -> AdapterConfig {
    let base = AdapterConfig::default();
    match config.graph_backend {
        AdapterType::Neo4j => AdapterConfig {
            uri: config.neo4j_uri.clone(),
            username: config.neo4j_user.clone(),
            password: config.neo4j_password.clone(),
            ..base
        },
        AdapterType::FalkorDb => AdapterConfig { uri: config.falkordb_url.clone(), ..base },
    }
}

fn vector_client_handle(config: &Configuration) -> anyhow::Result<QdrantClient> {
    let mut qdrant_config = QdrantClientConfig::from_url(&config.qdrant_url);
    if let Some(api_key) = &config.qdrant_api_key {
        qdrant_config.api_key = Some(api_key.clone());
    }
    Ok(QdrantClient::new(Some(qdrant_config))?)
}
