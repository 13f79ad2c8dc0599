//! Catalog browsing through the cursor cache.
//!
//! A [`PackageQuery`] renders to one SQL statement over the latest rows. Each
//! browsing session gets its own sub-pool of the shared [`CursorPool`], so a
//! user flipping through pages of the same listing keeps hitting one open
//! cursor while the total number of live queries stays bounded.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, trace};

use crate::{
  config::WebConfig,
  cursor::{CatalogCursors, CursorError, CursorKey, CursorPool, QueryParam, ReusableCursor},
  db::CatalogDb,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BrowseError {
  #[error(transparent)]
  Cursor(#[from] CursorError),
  #[error("Page size must be one of 25, 50 or 100, got {0}")]
  InvalidPageSize(u32),
  #[error("Unknown sort key: {0}")]
  InvalidSort(String),
}

// ============================================================================
// Query parameters
// ============================================================================

/// Rows per page; only a few sizes are offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageSize(u32);

impl PageSize {
  pub const ALLOWED: [u32; 3] = [25, 50, 100];

  pub fn get(self) -> u32 {
    self.0
  }
}

impl Default for PageSize {
  fn default() -> Self {
    Self(25)
  }
}

impl TryFrom<u32> for PageSize {
  type Error = BrowseError;

  fn try_from(value: u32) -> Result<Self, Self::Error> {
    if Self::ALLOWED.contains(&value) {
      Ok(Self(value))
    } else {
      Err(BrowseError::InvalidPageSize(value))
    }
  }
}

impl From<PageSize> for u32 {
  fn from(size: PageSize) -> Self {
    size.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flagged {
  #[default]
  Any,
  Yes,
  No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
  Name,
  LastUpdate,
  Arch,
}

impl SortKey {
  fn column(self) -> &'static str {
    match self {
      SortKey::Name => "p.name",
      SortKey::LastUpdate => "p.last_update",
      SortKey::Arch => "p.arch",
    }
  }
}

impl std::str::FromStr for SortKey {
  type Err = BrowseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "name" => Ok(SortKey::Name),
      "last_update" => Ok(SortKey::LastUpdate),
      "arch" => Ok(SortKey::Arch),
      other => Err(BrowseError::InvalidSort(other.to_string())),
    }
  }
}

/// Parse a comma separated ordering such as `last_update,name,asc`.
///
/// Unknown parts are ignored; `asc` anywhere flips the default descending
/// order. Returns the keys and whether the order is descending.
pub fn parse_order(raw: &str) -> (Vec<SortKey>, bool) {
  let mut keys = Vec::new();
  let mut descending = true;
  for part in raw.to_lowercase().split(',').map(str::trim) {
    if part == "asc" {
      descending = false;
    } else if let Ok(key) = part.parse::<SortKey>()
      && !keys.contains(&key)
    {
      keys.push(key);
    }
  }
  (keys, descending)
}

/// What a browsing user asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageQuery {
  /// Free text, matched by the full-text index over name, base and description
  pub search: Option<String>,
  pub arches: Vec<String>,
  /// Owner user id
  pub maintainer: Option<i64>,
  pub flagged: Flagged,
  /// Unix seconds; only rows updated at or after this
  pub updated_since: Option<i64>,
  pub order: Vec<SortKey>,
  pub descending: bool,
  pub page_size: PageSize,
  /// 1-based
  pub page: u32,
}

impl Default for PackageQuery {
  fn default() -> Self {
    Self {
      search: None,
      arches: Vec::new(),
      maintainer: None,
      flagged: Flagged::Any,
      updated_since: None,
      order: vec![SortKey::LastUpdate],
      descending: true,
      page_size: PageSize::default(),
      page: 1,
    }
  }
}

const SUMMARY_COLUMNS: &str = "p.id, p.name, p.arch, p.version, p.description, p.last_update, p.flag_date, \
                               u.username AS maintainer";

impl PackageQuery {
  pub fn with_order(mut self, raw: &str) -> Self {
    let (order, descending) = parse_order(raw);
    if !order.is_empty() {
      self.order = order;
    }
    self.descending = descending;
    self
  }

  /// The listing this query pages through. Page and page size are not part
  /// of it, so every page of one listing shares a cursor.
  pub fn to_key(&self) -> CursorKey {
    let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM packages p LEFT JOIN users u ON u.id = p.owner WHERE p.latest");
    let mut params = Vec::new();

    if let Some(terms) = self.search.as_deref().and_then(fts_terms) {
      sql.push_str(" AND p.id IN (SELECT rowid FROM packages_fts WHERE packages_fts MATCH ?)");
      params.push(QueryParam::Text(terms));
    }

    if !self.arches.is_empty() {
      let marks = vec!["?"; self.arches.len()].join(", ");
      sql.push_str(&format!(" AND p.arch IN ({marks})"));
      params.extend(self.arches.iter().cloned().map(QueryParam::Text));
    }

    if let Some(owner) = self.maintainer {
      sql.push_str(" AND p.owner = ?");
      params.push(QueryParam::Int(owner));
    }

    match self.flagged {
      Flagged::Any => {}
      Flagged::Yes => sql.push_str(" AND p.flag_date IS NOT NULL"),
      Flagged::No => sql.push_str(" AND p.flag_date IS NULL"),
    }

    if let Some(since) = self.updated_since {
      sql.push_str(" AND p.last_update >= ?");
      params.push(QueryParam::Int(since));
    }

    let direction = if self.descending { "DESC" } else { "ASC" };
    let mut order: Vec<String> = self
      .order
      .iter()
      .map(|key| format!("{} {direction}", key.column()))
      .collect();
    order.push(format!("p.id {direction}"));
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));

    CursorKey::new(sql, params)
  }

  fn offset(&self) -> u64 {
    u64::from(self.page.max(1) - 1) * u64::from(self.page_size.get())
  }
}

/// Quote every whitespace separated term so user input is never read as
/// FTS5 syntax. Terms are ANDed.
fn fts_terms(raw: &str) -> Option<String> {
  let terms: Vec<String> = raw
    .split_whitespace()
    .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
    .collect();
  (!terms.is_empty()).then(|| terms.join(" "))
}

// ============================================================================
// Results
// ============================================================================

/// One listed package
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PackageSummary {
  pub id: i64,
  pub name: String,
  pub arch: String,
  pub version: String,
  pub description: Option<String>,
  pub last_update: i64,
  pub flag_date: Option<i64>,
  pub maintainer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  pub rows: Vec<PackageSummary>,
  pub total: u64,
  pub page: u32,
  pub pages: u64,
  pub page_size: u32,
}

// ============================================================================
// Browser
// ============================================================================

pub struct Browser {
  provider: CatalogCursors,
  pool: Arc<CursorPool<PackageSummary>>,
  session_size: usize,
  sessions: DashMap<String, Arc<CursorPool<PackageSummary>>>,
}

impl Browser {
  pub fn new(db: CatalogDb, config: &WebConfig) -> Self {
    Self {
      provider: CatalogCursors::new(db),
      pool: CursorPool::new("catalog", config.cursor_pool_size, config.reusable_window()),
      session_size: config.session_cursor_pool_size,
      sessions: DashMap::new(),
    }
  }

  /// The cursor pool of a browsing session, created on first use
  pub fn session(&self, id: &str) -> Arc<CursorPool<PackageSummary>> {
    let entry = self
      .sessions
      .entry(id.to_string())
      .or_insert_with(|| self.pool.sub_pool(id, self.session_size));
    Arc::clone(entry.value())
  }

  /// Forget a session; its cursors stay shared until they expire
  pub fn end_session(&self, id: &str) -> bool {
    self.sessions.remove(id).is_some()
  }

  pub fn pool(&self) -> &Arc<CursorPool<PackageSummary>> {
    &self.pool
  }

  /// One page of a listing for a session
  pub async fn page(&self, session: &str, query: &PackageQuery) -> Result<Page, BrowseError> {
    let pool = self.session(session);
    let key = query.to_key();
    trace!(session, sql = %key.sql, page = query.page, "Browsing catalog");

    let cursor = pool.get_cursor(&self.provider, key.clone()).await?;
    match Self::read(&cursor, query).await {
      // evicted or expired between lookup and fetch
      Err(CursorError::Closed) => {
        debug!(session, "Cursor closed before the page was read, reopening");
        let cursor = pool.get_cursor(&self.provider, key).await?;
        Ok(Self::read(&cursor, query).await?)
      }
      other => Ok(other?),
    }
  }

  async fn read(cursor: &ReusableCursor<PackageSummary>, query: &PackageQuery) -> Result<Page, CursorError> {
    let size = query.page_size.get();
    let total = cursor.count().await?;
    let rows = cursor.fetch(u64::from(size), query.offset()).await?;

    Ok(Page {
      rows,
      total,
      page: query.page.max(1),
      pages: total.div_ceil(u64::from(size)),
      page_size: size,
    })
  }
}
