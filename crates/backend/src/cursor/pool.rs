use std::{
  sync::{
    Arc, Weak,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use super::{CursorError, CursorKey, CursorProvider, IdleListener, ReusableCursor};

/// Where a pool gets new cursors from
enum Spawner<R> {
  /// Open a new result set with the given reusable window
  Direct { window: Duration },
  /// Borrow from a parent pool; the cursor is shared with it
  Parent(Arc<CursorPool<R>>),
}

/// A bounded set of live cursors, reused by key.
///
/// When the pool is full, asking for a new key first closes the least
/// recently used idle cursor; if none is idle the caller waits, and the next
/// cursor to go idle is closed for it.
pub struct CursorPool<R> {
  name: String,
  size: usize,
  cursors: Mutex<Vec<Arc<ReusableCursor<R>>>>,
  permits: Arc<Semaphore>,
  waiting: AtomicUsize,
  spawner: Spawner<R>,
  me: Weak<Self>,
}

/// Counts a caller as waiting for a slot while alive
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
  fn enter(counter: &'a AtomicUsize) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(counter)
  }
}

impl Drop for Waiting<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl<R: Send + 'static> CursorPool<R> {
  pub fn new(name: impl Into<String>, size: usize, window: Duration) -> Arc<Self> {
    Self::build(name.into(), size, Spawner::Direct { window })
  }

  /// A smaller view on this pool, e.g. one per browsing session
  pub fn sub_pool(self: &Arc<Self>, name: impl Into<String>, size: usize) -> Arc<Self> {
    Self::build(name.into(), size, Spawner::Parent(Arc::clone(self)))
  }

  fn build(name: String, size: usize, spawner: Spawner<R>) -> Arc<Self> {
    let size = size.max(1);
    Arc::new_cyclic(|me| Self {
      name,
      size,
      cursors: Mutex::new(Vec::new()),
      permits: Arc::new(Semaphore::new(size)),
      waiting: AtomicUsize::new(0),
      spawner,
      me: me.clone(),
    })
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Callers blocked on a free slot
  pub fn waiting(&self) -> usize {
    self.waiting.load(Ordering::SeqCst)
  }

  /// Live cursors currently tracked
  pub async fn open_cursors(&self) -> usize {
    self.cursors.lock().await.len()
  }

  /// A live cursor for `key`, reusing one if possible
  pub fn get_cursor<'a>(
    &'a self,
    provider: &'a dyn CursorProvider<R>,
    key: CursorKey,
  ) -> BoxFuture<'a, Result<Arc<ReusableCursor<R>>, CursorError>> {
    async move {
      if let Some(found) = self.find(&key).await {
        trace!(pool = %self.name, "Reusing cursor");
        return Ok(found);
      }

      let permit = self.acquire().await?;
      if let Some(found) = self.find(&key).await {
        return Ok(found);
      }

      let cursor = match &self.spawner {
        Spawner::Direct { window } => {
          debug!(pool = %self.name, "Opening cursor");
          ReusableCursor::spawn(key.clone(), provider.open(&key), *window)
        }
        Spawner::Parent(parent) => parent.get_cursor(provider, key).await?,
      };

      {
        let mut cursors = self.cursors.lock().await;
        if let Some(existing) = cursors.iter().find(|c| Arc::ptr_eq(c, &cursor)) {
          return Ok(Arc::clone(existing));
        }
        cursors.push(Arc::clone(&cursor));
      }

      let listener: Weak<dyn IdleListener<R>> = self.me.clone();
      cursor.add_listener(listener);
      self.release_when_closed(&cursor, permit);
      Ok(cursor)
    }
    .boxed()
  }

  async fn find(&self, key: &CursorKey) -> Option<Arc<ReusableCursor<R>>> {
    let cursors = self.cursors.lock().await;
    cursors.iter().find(|c| c.key() == key && !c.is_closed()).cloned()
  }

  async fn acquire(&self) -> Result<OwnedSemaphorePermit, CursorError> {
    if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
      return Ok(permit);
    }

    let _waiting = Waiting::enter(&self.waiting);
    self.evict_idle().await;
    Arc::clone(&self.permits)
      .acquire_owned()
      .await
      .map_err(|_| CursorError::Closed)
  }

  /// Close the least recently used idle cursor, if any
  async fn evict_idle(&self) {
    let victim = {
      let cursors = self.cursors.lock().await;
      cursors
        .iter()
        .filter(|c| c.is_idle() && !c.is_closed())
        .min_by_key(|c| c.last_access())
        .cloned()
    };

    if let Some(victim) = victim {
      debug!(pool = %self.name, "Pool full, closing least recently used cursor");
      victim.close().await;
    }
  }

  /// Drop the cursor from the pool and free its slot once it closes
  fn release_when_closed(&self, cursor: &Arc<ReusableCursor<R>>, permit: OwnedSemaphorePermit) {
    let pool = self.me.clone();
    let cursor = Arc::clone(cursor);

    tokio::spawn(async move {
      cursor.closed().await;
      if let Some(pool) = pool.upgrade() {
        pool.cursors.lock().await.retain(|c| !Arc::ptr_eq(c, &cursor));
        trace!(pool = %pool.name, "Cursor released");
      }
      drop(permit);
    });
  }
}

impl<R: Send + 'static> IdleListener<R> for CursorPool<R> {
  fn on_idle(&self, cursor: &Arc<ReusableCursor<R>>) {
    if self.waiting() == 0 {
      return;
    }

    debug!(pool = %self.name, waiting = self.waiting(), "Closing idle cursor for a waiting caller");
    let cursor = Arc::clone(cursor);
    tokio::spawn(async move { cursor.close().await });
  }
}
