//! Catalog-backed result sets.
//!
//! A source runs `COUNT(*)` over the query once, then reads pages with
//! `LIMIT`/`OFFSET` from wherever the cursor is positioned. Pool connections
//! are only held for the duration of each statement.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool, sqlite::SqliteRow};

use super::{CursorError, CursorKey, CursorProvider, QueryParam, RowSource};
use crate::db::CatalogDb;

/// Opens [`SqliteRowSource`]s against the catalog
#[derive(Clone)]
pub struct CatalogCursors {
  db: CatalogDb,
}

impl CatalogCursors {
  pub fn new(db: CatalogDb) -> Self {
    Self { db }
  }
}

impl<R> CursorProvider<R> for CatalogCursors
where
  R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
  fn open(&self, key: &CursorKey) -> Box<dyn RowSource<R>> {
    Box::new(SqliteRowSource::new(self.db.pool().clone(), key.clone()))
  }
}

pub struct SqliteRowSource<R> {
  pool: SqlitePool,
  key: CursorKey,
  offset: u64,
  _rows: PhantomData<fn() -> R>,
}

impl<R> SqliteRowSource<R> {
  pub fn new(pool: SqlitePool, key: CursorKey) -> Self {
    Self {
      pool,
      key,
      offset: 0,
      _rows: PhantomData,
    }
  }
}

fn to_i64(value: u64) -> i64 {
  i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl<R> RowSource<R> for SqliteRowSource<R>
where
  R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
  async fn execute(&mut self) -> Result<u64, CursorError> {
    let sql = format!("SELECT COUNT(*) FROM ({})", self.key.sql);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for param in &self.key.params {
      query = match param {
        QueryParam::Text(text) => query.bind(text.clone()),
        QueryParam::Int(value) => query.bind(*value),
      };
    }

    let total = query.fetch_one(&self.pool).await?;
    self.offset = 0;
    Ok(u64::try_from(total).unwrap_or(0))
  }

  async fn scroll(&mut self, offset: u64) -> Result<(), CursorError> {
    self.offset = offset;
    Ok(())
  }

  async fn fetch_many(&mut self, limit: u64) -> Result<Vec<R>, CursorError> {
    let sql = format!("{} LIMIT ? OFFSET ?", self.key.sql);
    let mut query = sqlx::query_as::<_, R>(&sql);
    for param in &self.key.params {
      query = match param {
        QueryParam::Text(text) => query.bind(text.clone()),
        QueryParam::Int(value) => query.bind(*value),
      };
    }

    let rows = query
      .bind(to_i64(limit))
      .bind(to_i64(self.offset))
      .fetch_all(&self.pool)
      .await?;
    self.offset += rows.len() as u64;
    Ok(rows)
  }
}
