//! Command dispatcher for the processor.
//!
//! The dispatcher owns the management socket. Every accepted connection is
//! read as a stream of JSON-line frames; frames and in-process submissions
//! land on one queue, and each command runs in its own task under a global
//! concurrency limit. A failing or panicking command is logged and does not
//! affect any other command.
//!
//! Only one dispatcher may own a socket. [`Dispatcher::bind`] checks for a
//! live listener first and reports "not ready" instead of stealing it, which
//! is how short-lived tools decide to forward work to a running processor.

use std::{
  any::Any,
  panic::AssertUnwindSafe,
  path::{Path, PathBuf},
  sync::Arc,
};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use tokio::{
  net::{UnixListener, UnixStream},
  sync::{Semaphore, mpsc},
};
use tokio_util::{
  codec::{FramedRead, LinesCodec},
  sync::CancellationToken,
  task::TaskTracker,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
  actor::ProcessorError,
  config::RepositoryConfig,
  ipc::{Command, IpcError},
};

/// Frames waiting for a worker slot
const QUEUE_DEPTH: usize = 1024;

// ============================================================================
// Configuration
// ============================================================================

pub struct DispatcherConfig {
  /// Path to the Unix socket for commands
  pub socket_path: PathBuf,

  /// Maximum commands in flight
  pub concurrent_jobs: usize,
}

impl From<&RepositoryConfig> for DispatcherConfig {
  fn from(config: &RepositoryConfig) -> Self {
    Self {
      socket_path: config.management_socket.clone(),
      concurrent_jobs: config.concurrent_jobs,
    }
  }
}

/// Executes one command. Implemented by the processor.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
  async fn handle(&self, command: Command) -> Result<(), ProcessorError>;

  /// Wait for work the handler deferred past the end of a command
  async fn drain(&self) {}
}

/// In-process handle for submitting commands to a running dispatcher
#[derive(Clone)]
pub struct CommandSender {
  tx: mpsc::Sender<Command>,
}

impl CommandSender {
  pub async fn send(&self, command: Command) -> Result<(), IpcError> {
    self.tx.send(command).await.map_err(|_| IpcError::Shutdown)
  }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
  config: DispatcherConfig,
  listener: Option<UnixListener>,
  tx: mpsc::Sender<Command>,
  rx: mpsc::Receiver<Command>,
}

impl Dispatcher {
  /// Try to take ownership of the management socket.
  ///
  /// A socket file nobody answers on is treated as stale and replaced.
  pub async fn bind(config: DispatcherConfig) -> Result<Self, IpcError> {
    let listener = bind_socket(&config.socket_path).await?;
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    Ok(Self {
      config,
      listener,
      tx,
      rx,
    })
  }

  /// Whether this dispatcher owns the socket
  pub fn is_ready(&self) -> bool {
    self.listener.is_some()
  }

  pub fn socket_path(&self) -> &Path {
    &self.config.socket_path
  }

  pub fn sender(&self) -> CommandSender {
    CommandSender { tx: self.tx.clone() }
  }

  /// Dispatch commands until cancelled, then wait for in-flight commands.
  pub async fn run<H: CommandHandler>(self, handler: Arc<H>, cancel: CancellationToken) {
    let Self {
      config,
      listener,
      tx,
      mut rx,
    } = self;

    let semaphore = Arc::new(Semaphore::new(config.concurrent_jobs.max(1)));
    let tracker = TaskTracker::new();

    if listener.is_some() {
      info!(socket = %config.socket_path.display(), jobs = config.concurrent_jobs, "Dispatcher listening");
    }

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          info!("Dispatcher shutting down");
          break;
        }

        accepted = accept(listener.as_ref()) => {
          match accepted {
            Ok(stream) => {
              tokio::spawn(read_frames(stream, tx.clone(), cancel.clone()));
            }
            Err(e) => error!(error = %e, "Accept error"),
          }
        }

        Some(command) = rx.recv() => {
          dispatch(&tracker, &semaphore, &handler, command);
        }
      }
    }

    tracker.close();
    tracker.wait().await;
    handler.drain().await;
    debug!("In-flight commands finished");

    if listener.is_some() && config.socket_path.exists() {
      let _ = tokio::fs::remove_file(&config.socket_path).await;
    }
  }
}

async fn bind_socket(path: &Path) -> Result<Option<UnixListener>, IpcError> {
  if path.exists() {
    if UnixStream::connect(path).await.is_ok() {
      info!(socket = %path.display(), "Another processor owns the socket");
      return Ok(None);
    }
    debug!(socket = %path.display(), "Removing stale socket");
    tokio::fs::remove_file(path).await?;
  }

  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  match UnixListener::bind(path) {
    Ok(listener) => Ok(Some(listener)),
    Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
      info!(socket = %path.display(), "Socket taken while binding");
      Ok(None)
    }
    Err(e) => Err(e.into()),
  }
}

async fn accept(listener: Option<&UnixListener>) -> std::io::Result<UnixStream> {
  match listener {
    Some(listener) => listener.accept().await.map(|(stream, _)| stream),
    None => std::future::pending().await,
  }
}

/// Forward frames from one connection onto the queue
async fn read_frames(stream: UnixStream, tx: mpsc::Sender<Command>, cancel: CancellationToken) {
  trace!("Command connection opened");
  let mut lines = FramedRead::new(stream, LinesCodec::new());

  loop {
    let line = tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      line = lines.next() => line,
    };

    let line = match line {
      Some(Ok(line)) => line,
      Some(Err(e)) => {
        warn!(error = %e, "Error reading command frame");
        break;
      }
      None => break,
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    match serde_json::from_str::<Command>(trimmed) {
      Ok(command) => {
        if tx.send(command).await.is_err() {
          break;
        }
      }
      Err(e) => warn!(error = %e, frame = %trimmed, "Invalid command frame"),
    }
  }
  trace!("Command connection closed");
}

fn dispatch<H: CommandHandler>(
  tracker: &TaskTracker,
  semaphore: &Arc<Semaphore>,
  handler: &Arc<H>,
  command: Command,
) {
  let semaphore = Arc::clone(semaphore);
  let handler = Arc::clone(handler);

  tracker.spawn(async move {
    let Ok(_permit) = semaphore.acquire_owned().await else {
      return;
    };

    let label = command.describe();
    trace!(command = %label, "Dispatching");
    match AssertUnwindSafe(handler.handle(command)).catch_unwind().await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => error!(command = %label, error = %e, "Command failed"),
      Err(panic) => error!(command = %label, panic = %panic_message(&*panic), "Command panicked"),
    }
  });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
