//! Reusable query cursors for paging through the catalog.
//!
//! A [`ReusableCursor`] owns one open result set and serves page fetches for
//! it one at a time, so a user paging forward through the same query does not
//! pay for re-running it. Cursors are shared through a [`CursorPool`], which
//! bounds how many are open at once and evicts idle ones; a pool can also be
//! a per-session view on top of a parent pool.

#[cfg(test)]
mod mock;
mod pool;
mod reusable;
mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

pub use pool::CursorPool;
pub use reusable::{IdleListener, ReusableCursor};
pub use sqlite::{CatalogCursors, SqliteRowSource};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
  #[error("Query failed: {0}")]
  Query(String),
  #[error("Cursor closed")]
  Closed,
}

impl From<sqlx::Error> for CursorError {
  fn from(err: sqlx::Error) -> Self {
    CursorError::Query(err.to_string())
  }
}

// ============================================================================
// Query identity
// ============================================================================

/// A bound query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum QueryParam {
  Text(String),
  Int(i64),
}

/// Cursors are shared between callers issuing the same SQL with the same parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorKey {
  pub sql: String,
  pub params: Vec<QueryParam>,
}

impl CursorKey {
  pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
    Self {
      sql: sql.into(),
      params,
    }
  }
}

// ============================================================================
// Backends
// ============================================================================

/// A stateful result set
#[async_trait]
pub trait RowSource<R>: Send {
  /// Run the query and return the total row count
  async fn execute(&mut self) -> Result<u64, CursorError>;

  /// Position so the next fetch starts at `offset`
  async fn scroll(&mut self, offset: u64) -> Result<(), CursorError>;

  /// Read up to `limit` rows from the current position
  async fn fetch_many(&mut self, limit: u64) -> Result<Vec<R>, CursorError>;
}

/// Opens result sets for a key
pub trait CursorProvider<R>: Send + Sync {
  fn open(&self, key: &CursorKey) -> Box<dyn RowSource<R>>;
}
