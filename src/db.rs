/// Thin SQLite pool wrapper shared by the repository metadata store (R1)
/// and the update-history ledger, following the project's existing
/// `SqlDb`-over-`sqlx` idiom.
use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[derive(Clone)]
pub struct SqlDb {
    pool: SqlitePool,
}

impl SqlDb {
    pub async fn new(data_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_path)?;
        let db_path = data_path.join("metadata.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
