//! In-memory row source for cursor tests

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

use super::{CursorError, CursorKey, CursorProvider, RowSource};

#[derive(Default)]
pub struct SourceStats {
  executes: AtomicUsize,
  scrolls: AtomicUsize,
  opened: AtomicUsize,
}

impl SourceStats {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn executes(&self) -> usize {
    self.executes.load(Ordering::SeqCst)
  }

  pub fn scrolls(&self) -> usize {
    self.scrolls.load(Ordering::SeqCst)
  }

  pub fn opened(&self) -> usize {
    self.opened.load(Ordering::SeqCst)
  }
}

/// Rows `0..total`
pub struct MockSource {
  total: u32,
  position: u32,
  fail: bool,
  stats: Arc<SourceStats>,
}

impl MockSource {
  pub fn boxed(total: u32, stats: &Arc<SourceStats>) -> Box<dyn RowSource<u32>> {
    Box::new(Self {
      total,
      position: 0,
      fail: false,
      stats: Arc::clone(stats),
    })
  }

  pub fn failing(stats: &Arc<SourceStats>) -> Box<dyn RowSource<u32>> {
    Box::new(Self {
      total: 0,
      position: 0,
      fail: true,
      stats: Arc::clone(stats),
    })
  }
}

#[async_trait]
impl RowSource<u32> for MockSource {
  async fn execute(&mut self) -> Result<u64, CursorError> {
    self.stats.executes.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(CursorError::Query("no such table".to_string()));
    }
    Ok(u64::from(self.total))
  }

  async fn scroll(&mut self, offset: u64) -> Result<(), CursorError> {
    self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
    self.position = u32::try_from(offset).unwrap_or(u32::MAX).min(self.total);
    Ok(())
  }

  async fn fetch_many(&mut self, limit: u64) -> Result<Vec<u32>, CursorError> {
    let end = self
      .position
      .saturating_add(u32::try_from(limit).unwrap_or(u32::MAX))
      .min(self.total);
    let rows = (self.position..end).collect();
    self.position = end;
    Ok(rows)
  }
}

/// Provider opening a fresh `0..rows` source for every key
pub struct MockProvider {
  pub rows: u32,
  pub stats: Arc<SourceStats>,
}

impl CursorProvider<u32> for MockProvider {
  fn open(&self, _key: &CursorKey) -> Box<dyn RowSource<u32>> {
    self.stats.opened.fetch_add(1, Ordering::SeqCst);
    MockSource::boxed(self.rows, &self.stats)
  }
}
