/// Hybrid code graph: a backend-agnostic node/edge model (§3.4-3.5) plus two
/// concrete adapters (Neo4j, FalkorDB), a cached query service, migration
/// between backends, and tree-sitter-driven ingestion.
pub mod adapter;
pub mod cache;
pub mod error;
pub mod falkordb;
pub mod ingestion;
pub mod migration;
pub mod neo4j;
pub mod query_service;
pub mod schema;
pub mod types;

pub use adapter::{create_graph_adapter, AdapterConfig, AdapterType, GraphAdapter};
pub use error::{GraphError, GraphServiceError};
pub use ingestion::{ingest_repository, IngestionResult};
pub use migration::{migrate, MigrationMode, MigrationReport};
pub use query_service::{ArchitectureArgs, DependenciesArgs, GraphQueryService, PathArgs};
pub use types::{GraphNode, Relationship, RelationshipType};
