//! Processor lifecycle.
//!
//! # Architecture
//!
//! ```text
//! Daemon
//!   ├── Dispatcher (management socket + in-process queue)
//!   │     └── Processor (one task per command)
//!   └── WatcherTask (optional, feeds the dispatcher queue)
//! ```
//!
//! # Lifecycle
//!
//! 1. Open the catalog
//! 2. Bind the management socket; give up if another processor owns it
//! 3. Start the watcher relay on the dispatcher's queue
//! 4. Dispatch until cancelled (ctrl-c), then drain in-flight commands
//!
//! Short-lived tools use [`attach`] instead: they run a processor of their
//! own when nobody else does, and otherwise forward to the running one.

use std::{path::PathBuf, sync::Arc};

use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  actor::{Processor, ProcessorHandle, WatcherError, WatcherTask},
  config::{Config, RepositoryConfig},
  db::{CatalogDb, DbError},
  ipc::{CommandClient, IpcError},
  server::{Dispatcher, DispatcherConfig},
  tools::Tools,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
  #[error(transparent)]
  Db(#[from] DbError),
  #[error(transparent)]
  Ipc(#[from] IpcError),
  #[error(transparent)]
  Watcher(#[from] WatcherError),
  #[error("A processor is already running on {0}")]
  AlreadyRunning(PathBuf),
}

// ============================================================================
// Daemon
// ============================================================================

/// The long-running repository processor
pub struct Daemon {
  config: Config,
  watch: bool,
}

impl Daemon {
  pub fn new(config: Config) -> Self {
    Self { config, watch: true }
  }

  /// Serve the socket only; events come from a separate `watch` process
  pub fn without_watcher(mut self) -> Self {
    self.watch = false;
    self
  }

  /// Run until ctrl-c
  pub async fn run(self) -> Result<(), DaemonError> {
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
      if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        return;
      }
      info!("Received ctrl-c, shutting down...");
      cancel_for_signal.cancel();
    });

    self.run_until(cancel).await
  }

  /// Run until `cancel` fires
  pub async fn run_until(self, cancel: CancellationToken) -> Result<(), DaemonError> {
    let repo = &self.config.repository;
    info!(root = %repo.path.display(), socket = %repo.management_socket.display(), "Starting repository processor");

    let db = CatalogDb::open(&self.config.database).await?;
    let processor = Processor::new(repo.clone(), db.clone(), Tools::from_config(repo));

    let dispatcher = Dispatcher::bind(DispatcherConfig::from(repo)).await?;
    if !dispatcher.is_ready() {
      return Err(DaemonError::AlreadyRunning(repo.management_socket.clone()));
    }

    let watcher = if self.watch {
      let handle = ProcessorHandle::Queue(dispatcher.sender());
      Some(WatcherTask::spawn(repo.path.clone(), handle, cancel.child_token())?)
    } else {
      info!("Embedded watcher disabled");
      None
    };

    dispatcher.run(Arc::new(processor), cancel.child_token()).await;

    cancel.cancel();
    if let Some(watcher) = watcher
      && let Err(e) = watcher.await
    {
      warn!(error = %e, "Watcher task failed");
    }
    db.close().await;

    info!("Processor shutdown complete");
    Ok(())
  }
}

/// Relay filesystem events to a processor running in another process
pub async fn run_watch_relay(config: &RepositoryConfig, cancel: CancellationToken) -> Result<(), DaemonError> {
  let client = CommandClient::connect(&config.management_socket).await?;
  info!(socket = %config.management_socket.display(), "Connected to processor");

  let watcher = WatcherTask::spawn(config.path.clone(), ProcessorHandle::Remote(client), cancel)?;
  if let Err(e) = watcher.await {
    warn!(error = %e, "Watcher task failed");
  }
  Ok(())
}

// ============================================================================
// Attaching
// ============================================================================

/// A processor handle for a one-shot tool
pub struct Attached {
  pub handle: ProcessorHandle,
  serving: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Attached {
  /// Whether this process is serving the socket itself
  pub fn is_local(&self) -> bool {
    self.serving.is_some()
  }

  /// Stop serving, if we were; waits for in-flight commands
  pub async fn finish(self) {
    if let Some((cancel, task)) = self.serving {
      cancel.cancel();
      if let Err(e) = task.await {
        warn!(error = %e, "Dispatcher task failed");
      }
    }
  }
}

/// Run a processor here if the socket is free, otherwise talk to the live one.
///
/// While attached locally, this process owns the management socket, so other
/// tools (and a `watch` relay) reach this processor in the meantime.
pub async fn attach(config: &Config, db: CatalogDb) -> Result<Attached, DaemonError> {
  let repo = &config.repository;
  let dispatcher = Dispatcher::bind(DispatcherConfig::from(repo)).await?;

  if dispatcher.is_ready() {
    info!("Repo processor is up");
    let processor = Processor::new(repo.clone(), db, Tools::from_config(repo));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(dispatcher.run(Arc::new(processor.clone()), cancel.clone()));
    return Ok(Attached {
      handle: ProcessorHandle::Local(processor),
      serving: Some((cancel, task)),
    });
  }

  debug!(socket = %repo.management_socket.display(), "Connecting to management socket");
  let client = CommandClient::connect(&repo.management_socket).await?;
  Ok(Attached {
    handle: ProcessorHandle::Remote(client),
    serving: None,
  })
}
