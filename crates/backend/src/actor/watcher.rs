//! WatcherTask - relays filesystem notifications to the processor
//!
//! The watcher bridges notify's sync callback with the async side:
//! 1. notify's callback uses `blocking_send` to forward events to a channel
//! 2. The async task turns each event into inotify-style frames
//! 3. Frames are submitted to the processor in arrival order
//!
//! There is no debouncing here. Deciding when a file is finished, and pairing
//! rename halves, is the processor's job.

use std::path::PathBuf;

use notify::{
  Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
  event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  events::{IN_CLOSE_WRITE, IN_CREATE, IN_DELETE, IN_ISDIR, IN_MODIFY, IN_MOVED_FROM, IN_MOVED_TO},
  handle::ProcessorHandle,
};
use crate::ipc::{Command, FsEvent};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
  #[error("Failed to initialize watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("Failed to watch path: {0}")]
  Watch(#[source] notify::Error),
}

// ============================================================================
// WatcherTask
// ============================================================================

pub struct WatcherTask {
  root: PathBuf,
  processor: ProcessorHandle,
  cancel: CancellationToken,
  // The notify watcher must be held to keep it alive
  _watcher: RecommendedWatcher,
  event_rx: mpsc::Receiver<Result<Event, notify::Error>>,
}

impl WatcherTask {
  /// Start watching `root` recursively. Events are not read until `run()`.
  pub fn new(root: PathBuf, processor: ProcessorHandle, cancel: CancellationToken) -> Result<Self, WatcherError> {
    info!(root = %root.display(), "Initializing repository watcher");

    let (event_tx, event_rx) = mpsc::channel::<Result<Event, notify::Error>>(1024);

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // runs on notify's thread
        let _ = event_tx.blocking_send(res);
      },
      Config::default(),
    )
    .map_err(WatcherError::Init)?;

    watcher
      .watch(&root, RecursiveMode::Recursive)
      .map_err(WatcherError::Watch)?;

    Ok(Self {
      root,
      processor,
      cancel,
      _watcher: watcher,
      event_rx,
    })
  }

  pub fn spawn(
    root: PathBuf,
    processor: ProcessorHandle,
    cancel: CancellationToken,
  ) -> Result<tokio::task::JoinHandle<()>, WatcherError> {
    let task = Self::new(root, processor, cancel)?;
    Ok(tokio::spawn(task.run()))
  }

  pub async fn run(mut self) {
    info!(root = %self.root.display(), "WatcherTask started");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("WatcherTask shutting down (cancelled)");
          break;
        }

        event = self.event_rx.recv() => {
          match event {
            Some(Ok(event)) => self.relay(event).await,
            Some(Err(e)) => warn!(error = %e, "Watcher error"),
            None => {
              info!("WatcherTask shutting down (channel closed)");
              break;
            }
          }
        }
      }
    }

    info!(root = %self.root.display(), "WatcherTask stopped");
  }

  async fn relay(&self, event: Event) {
    for frame in to_frames(&event) {
      trace!(mask = frame.mask, cookie = ?frame.cookie, path = %frame.path.display(), "Relaying event");
      if let Err(e) = self.processor.submit(Command::FilesystemEvent(frame)).await {
        warn!(error = %e, "Failed to relay event");
      }
    }
  }
}

/// Translate one notify event into inotify-style frames.
///
/// Only move frames carry a cookie.
pub fn to_frames(event: &Event) -> Vec<FsEvent> {
  let (mask, is_move) = match event.kind {
    EventKind::Create(kind) => (IN_CREATE | dir_flag(kind == CreateKind::Folder), false),
    EventKind::Remove(kind) => (IN_DELETE | dir_flag(kind == RemoveKind::Folder), false),
    EventKind::Access(AccessKind::Close(AccessMode::Write)) => (IN_CLOSE_WRITE, false),
    EventKind::Modify(ModifyKind::Name(RenameMode::From)) => (IN_MOVED_FROM, true),
    EventKind::Modify(ModifyKind::Name(RenameMode::To)) => (IN_MOVED_TO, true),
    EventKind::Modify(ModifyKind::Name(_)) => {
      // the backend also reports each half separately
      trace!(paths = ?event.paths, "Skipping combined rename event");
      return Vec::new();
    }
    EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => (IN_MODIFY, false),
    _ => {
      debug!(kind = ?event.kind, "Unhandled watcher event");
      return Vec::new();
    }
  };

  let cookie = event.tracker().filter(|_| is_move).map(|tracker| tracker as u32);

  event
    .paths
    .iter()
    .map(|path| {
      let frame = FsEvent::new(mask, path.clone());
      match cookie {
        Some(cookie) => frame.with_cookie(cookie),
        None => frame,
      }
    })
    .collect()
}

fn dir_flag(is_dir: bool) -> u32 {
  if is_dir { IN_ISDIR } else { 0 }
}
