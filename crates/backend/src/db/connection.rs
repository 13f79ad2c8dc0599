use std::{path::Path, time::Duration};

use sqlx::{
  SqlitePool,
  sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use thiserror::Error;
use tracing::{debug, error, info};

use super::schema::SCHEMA;
use crate::config::DatabaseConfig;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("SQLite error: {0}")]
  Sqlx(#[from] sqlx::Error),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("Not found: {0}")]
  NotFound(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Connection pool for the package catalog
#[derive(Clone)]
pub struct CatalogDb {
  pool: SqlitePool,
}

impl CatalogDb {
  /// Open the catalog described by the config
  pub async fn open(config: &DatabaseConfig) -> Result<Self> {
    Self::open_at_path(&config.path, config.max_connections).await
  }

  /// Open or create a catalog at a specific path
  pub async fn open_at_path(path: &Path, max_connections: u32) -> Result<Self> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    info!(path = %path.display(), max_connections, "Opening catalog database");

    let opts = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .synchronous(SqliteSynchronous::Normal)
      .foreign_keys(true)
      .busy_timeout(Duration::from_secs(5));

    let pool = match SqlitePoolOptions::new()
      .max_connections(max_connections.max(1))
      .connect_with(opts)
      .await
    {
      Ok(pool) => {
        debug!(path = %path.display(), "Catalog connection established");
        pool
      }
      Err(e) => {
        error!(path = %path.display(), err = %e, "Failed to connect to catalog");
        return Err(e.into());
      }
    };

    let db = Self { pool };

    debug!("Initializing catalog schema");
    db.ensure_schema().await?;

    Ok(db)
  }

  async fn ensure_schema(&self) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
    Ok(())
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }

  pub async fn close(&self) {
    self.pool.close().await;
  }
}
