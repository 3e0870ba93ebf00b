/// Process-wide configuration (§3.10, §6.4): a single `clap::Parser` struct
/// with environment-variable fallbacks, following the project's existing
/// `clap(long, env = "...")` convention.
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::graph::adapter::AdapterType;

#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    /// Directory to store all persistent state: the SQLite metadata
    /// database, the token store, and log files.
    #[clap(long, env = "DATA_PATH", default_value_os_t = default_data_path())]
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[clap(long, env = "QDRANT_URL", default_value_t = default_qdrant_url())]
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[clap(long, env = "QDRANT_API_KEY")]
    pub qdrant_api_key: Option<String>,

    #[clap(long, env = "GRAPH_BACKEND", value_enum, default_value = "neo4j")]
    #[serde(default)]
    pub graph_backend: AdapterType,

    #[clap(long, env = "NEO4J_URI", default_value_t = default_neo4j_uri())]
    #[serde(default = "default_neo4j_uri")]
    pub neo4j_uri: String,

    #[clap(long, env = "NEO4J_USER")]
    pub neo4j_user: Option<String>,

    #[clap(long, env = "NEO4J_PASSWORD")]
    pub neo4j_password: Option<String>,

    #[clap(long, env = "FALKORDB_URL", default_value_t = default_falkordb_url())]
    #[serde(default = "default_falkordb_url")]
    pub falkordb_url: String,

    #[clap(long, env = "EMBEDDING_PROVIDER_URL")]
    pub embedding_provider_url: Option<String>,

    #[clap(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,
}

impl Configuration {
    /// Directory where logs are written to.
    pub fn log_dir(&self) -> PathBuf {
        self.data_path.join("logs")
    }
}

fn default_data_path() -> PathBuf {
    "./data".into()
}

fn default_qdrant_url() -> String {
    "http://127.0.0.1:6334".to_owned()
}

fn default_neo4j_uri() -> String {
    "bolt://127.0.0.1:7687".to_owned()
}

fn default_falkordb_url() -> String {
    "redis://127.0.0.1:6379".to_owned()
}
