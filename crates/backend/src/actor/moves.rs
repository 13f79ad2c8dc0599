//! Pairing of MOVED_FROM / MOVED_TO halves by cookie.
//!
//! The first half of a rename parks here for the grace window. If the other
//! half arrives in time the caller gets both paths back and performs a move.
//! Otherwise the parked half's fallback runs (a delete for a lone MOVED_FROM,
//! a completion for a lone MOVED_TO). Exactly one of the two happens.

use std::{
  future::Future,
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveHalf {
  From,
  To,
}

/// Result of observing one half of a rename
#[derive(Debug, PartialEq, Eq)]
pub enum Observed {
  /// Both halves are known; the caller performs the move
  Paired { src: PathBuf, dest: PathBuf },
  /// Parked until the other half arrives or the grace window runs out
  Deferred,
}

struct PendingMove {
  half: MoveHalf,
  path: PathBuf,
  token: u64,
  /// `true` fires the fallback immediately, `false` (or drop) cancels it
  trigger: oneshot::Sender<bool>,
}

pub struct MoveTracker {
  pending: Arc<DashMap<u32, PendingMove>>,
  grace: Duration,
  next_token: AtomicU64,
  /// Grace timers and fallbacks run here so shutdown can wait for them
  tasks: TaskTracker,
}

impl MoveTracker {
  pub fn new(grace: Duration, tasks: TaskTracker) -> Self {
    Self {
      pending: Arc::new(DashMap::new()),
      grace,
      next_token: AtomicU64::new(0),
      tasks,
    }
  }

  /// Halves currently waiting for a partner
  pub fn pending(&self) -> usize {
    self.pending.len()
  }

  /// Record one half of a rename.
  ///
  /// `fallback` runs if this half is never paired. A repeated half with the
  /// same cookie can no longer pair the earlier one, so the earlier one's
  /// fallback fires right away.
  pub fn observe<F, Fut>(&self, cookie: u32, half: MoveHalf, path: PathBuf, fallback: F) -> Observed
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    match self.pending.entry(cookie) {
      Entry::Occupied(entry) if entry.get().half != half => {
        let other = entry.remove();
        let _ = other.trigger.send(false);
        trace!(cookie, "Paired rename halves");
        let (src, dest) = match half {
          MoveHalf::To => (other.path, path),
          MoveHalf::From => (path, other.path),
        };
        Observed::Paired { src, dest }
      }
      Entry::Occupied(mut entry) => {
        let (parked, token, rx) = self.park(half, path);
        let stale = entry.insert(parked);
        debug!(cookie, path = %stale.path.display(), "Rename half superseded, running fallback");
        let _ = stale.trigger.send(true);
        self.schedule(cookie, token, rx, fallback);
        Observed::Deferred
      }
      Entry::Vacant(entry) => {
        let (parked, token, rx) = self.park(half, path);
        entry.insert(parked);
        self.schedule(cookie, token, rx, fallback);
        Observed::Deferred
      }
    }
  }

  fn park(&self, half: MoveHalf, path: PathBuf) -> (PendingMove, u64, oneshot::Receiver<bool>) {
    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
    let (trigger, rx) = oneshot::channel();
    (
      PendingMove {
        half,
        path,
        token,
        trigger,
      },
      token,
      rx,
    )
  }

  fn schedule<F, Fut>(&self, cookie: u32, token: u64, mut rx: oneshot::Receiver<bool>, fallback: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let pending = Arc::clone(&self.pending);
    let grace = self.grace;

    self.tasks.spawn(async move {
      let signalled = tokio::select! {
        signal = &mut rx => Some(signal.unwrap_or(false)),
        _ = tokio::time::sleep(grace) => None,
      };

      let fire = match signalled {
        Some(fire) => fire,
        None if pending.remove_if(&cookie, |_, p| p.token == token).is_some() => true,
        // someone else took the entry and will signal through the trigger
        None => rx.await.unwrap_or(false),
      };

      if fire {
        trace!(cookie, "Running unpaired rename fallback");
        fallback().await;
      }
    });
  }
}
