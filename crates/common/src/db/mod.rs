//! Database layer for PaperBot
//!
//! Provides:
//! - SeaORM entity models
//! - Repository for the paper store
//! - Connection management and schema bootstrap

pub mod models;
mod repository;

pub use repository::{Repository, SortKey, StatusCounts};

use crate::config::DatabaseConfig;
use crate::errors::Result;
use models::PaperEntity;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Database connection wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using configuration and make sure the schema exists
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to paper store...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .sqlx_logging(config.sqlx_logging);

        let pool = Self {
            conn: Database::connect(opts).await?,
        };
        pool.migrate().await?;

        info!("Paper store ready");
        Ok(pool)
    }

    /// Private in-memory store, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        // One connection: every new SQLite memory connection is a fresh database
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);

        let pool = Self {
            conn: Database::connect(opts).await?,
        };
        pool.migrate().await?;
        Ok(pool)
    }

    /// Create the papers table and its lookup indexes if missing
    pub async fn migrate(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(PaperEntity);
        table.if_not_exists();
        self.conn.execute(backend.build(&table)).await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_papers_link ON papers (link)",
            "CREATE INDEX IF NOT EXISTS idx_papers_status ON papers (status)",
        ] {
            self.conn.execute_unprepared(ddl).await?;
        }

        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn.execute_unprepared("SELECT 1").await?;
        Ok(())
    }
}
