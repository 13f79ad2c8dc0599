use std::{
  sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use tokio::{
  sync::{mpsc, oneshot, watch},
  time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{CursorError, CursorKey, RowSource};

/// Told when a cursor has drained its queue
pub trait IdleListener<R>: Send + Sync {
  fn on_idle(&self, cursor: &Arc<ReusableCursor<R>>);
}

enum Request<R> {
  Fetch {
    limit: u64,
    offset: u64,
    reply: oneshot::Sender<Result<Vec<R>, CursorError>>,
  },
  Close {
    reply: oneshot::Sender<()>,
  },
}

struct Shared<R> {
  count: watch::Sender<Option<Result<u64, CursorError>>>,
  idle: AtomicBool,
  last_access: Mutex<Instant>,
  closed: CancellationToken,
  listeners: Mutex<Vec<Weak<dyn IdleListener<R>>>>,
}

impl<R> Shared<R> {
  fn touch(&self) {
    if let Ok(mut last) = self.last_access.lock() {
      *last = Instant::now();
    }
  }

  fn notify_idle(&self, cursor: &Arc<ReusableCursor<R>>) {
    let listeners: Vec<Arc<dyn IdleListener<R>>> = match self.listeners.lock() {
      Ok(mut listeners) => {
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
      }
      Err(_) => return,
    };
    for listener in listeners {
      listener.on_idle(cursor);
    }
  }
}

/// One open result set, served by its own task.
///
/// Fetches are answered strictly in order. The source is only repositioned
/// when a fetch does not continue where the previous one ended. The task
/// exits when it is closed, when no request arrives within the reusable
/// window, or when every handle is dropped.
pub struct ReusableCursor<R> {
  key: CursorKey,
  requests: mpsc::UnboundedSender<Request<R>>,
  shared: Arc<Shared<R>>,
}

impl<R: Send + 'static> ReusableCursor<R> {
  /// Start serving `source`; the query runs immediately.
  pub fn spawn(key: CursorKey, source: Box<dyn RowSource<R>>, window: Duration) -> Arc<Self> {
    let (requests, rx) = mpsc::unbounded_channel();
    let (count, _) = watch::channel(None);
    let shared = Arc::new(Shared {
      count,
      idle: AtomicBool::new(false),
      last_access: Mutex::new(Instant::now()),
      closed: CancellationToken::new(),
      listeners: Mutex::new(Vec::new()),
    });

    let cursor = Arc::new(Self {
      key,
      requests,
      shared: Arc::clone(&shared),
    });
    tokio::spawn(work(source, rx, shared, window, Arc::downgrade(&cursor)));
    cursor
  }

  pub fn key(&self) -> &CursorKey {
    &self.key
  }

  /// Total rows; waits for the query to finish
  pub async fn count(&self) -> Result<u64, CursorError> {
    let mut rx = self.shared.count.subscribe();
    let value = rx.wait_for(Option::is_some).await.map_err(|_| CursorError::Closed)?;
    let result = value.clone();
    result.unwrap_or(Err(CursorError::Closed))
  }

  /// Read `limit` rows starting at `offset`
  pub async fn fetch(&self, limit: u64, offset: u64) -> Result<Vec<R>, CursorError> {
    let (reply, rx) = oneshot::channel();
    self
      .requests
      .send(Request::Fetch { limit, offset, reply })
      .map_err(|_| CursorError::Closed)?;
    rx.await.map_err(|_| CursorError::Closed)?
  }

  /// Queue a close behind any pending fetches and wait for it
  pub async fn close(&self) {
    let (reply, rx) = oneshot::channel();
    if self.requests.send(Request::Close { reply }).is_ok() {
      let _ = rx.await;
    }
  }

  /// Has served at least one fetch and has nothing queued
  pub fn is_idle(&self) -> bool {
    self.shared.idle.load(Ordering::Acquire)
  }

  pub fn is_closed(&self) -> bool {
    self.shared.closed.is_cancelled()
  }

  /// Resolves once the cursor's task has exited
  pub async fn closed(&self) {
    self.shared.closed.cancelled().await
  }

  pub fn last_access(&self) -> Instant {
    self.shared.last_access.lock().map(|last| *last).unwrap_or_else(|_| Instant::now())
  }

  pub fn add_listener(&self, listener: Weak<dyn IdleListener<R>>) {
    if let Ok(mut listeners) = self.shared.listeners.lock() {
      listeners.push(listener);
    }
  }
}

async fn work<R: Send + 'static>(
  mut source: Box<dyn RowSource<R>>,
  mut rx: mpsc::UnboundedReceiver<Request<R>>,
  shared: Arc<Shared<R>>,
  window: Duration,
  me: Weak<ReusableCursor<R>>,
) {
  let total = source.execute().await;
  let failure = total.as_ref().err().cloned();
  shared.count.send_replace(Some(total));
  if let Some(error) = failure {
    warn!(error = %error, "Cursor query failed");
    finish(&shared, &mut rx, Some(error));
    return;
  }

  // offset the source will read from next; None when unknown
  let mut position = Some(0u64);
  let mut served = false;

  loop {
    if served && rx.is_empty() {
      shared.idle.store(true, Ordering::Release);
      if let Some(cursor) = me.upgrade() {
        shared.notify_idle(&cursor);
      }
    }

    let request = match tokio::time::timeout(window, rx.recv()).await {
      Ok(Some(request)) => request,
      Ok(None) => break,
      Err(_) => {
        debug!("Cursor unused for the reusable window");
        break;
      }
    };
    shared.idle.store(false, Ordering::Release);

    match request {
      Request::Close { reply } => {
        let _ = reply.send(());
        break;
      }
      Request::Fetch { limit, offset, reply } => {
        let result = fetch(source.as_mut(), &mut position, limit, offset).await;
        served = true;
        shared.touch();
        let _ = reply.send(result);
      }
    }
  }

  finish(&shared, &mut rx, None);
}

async fn fetch<R>(
  source: &mut dyn RowSource<R>,
  position: &mut Option<u64>,
  limit: u64,
  offset: u64,
) -> Result<Vec<R>, CursorError> {
  if *position != Some(offset) {
    trace!(offset, "Repositioning cursor");
    if let Err(e) = source.scroll(offset).await {
      *position = None;
      return Err(e);
    }
  }

  match source.fetch_many(limit).await {
    Ok(rows) => {
      *position = Some(offset + rows.len() as u64);
      Ok(rows)
    }
    Err(e) => {
      *position = None;
      Err(e)
    }
  }
}

fn finish<R>(shared: &Shared<R>, rx: &mut mpsc::UnboundedReceiver<Request<R>>, error: Option<CursorError>) {
  shared.count.send_if_modified(|count| {
    if count.is_none() {
      *count = Some(Err(CursorError::Closed));
      true
    } else {
      false
    }
  });
  shared.idle.store(false, Ordering::Release);
  shared.closed.cancel();
  rx.close();

  while let Ok(request) = rx.try_recv() {
    match request {
      Request::Fetch { reply, .. } => {
        let _ = reply.send(Err(error.clone().unwrap_or(CursorError::Closed)));
      }
      Request::Close { reply } => {
        let _ = reply.send(());
      }
    }
  }
  trace!("Cursor closed");
}
