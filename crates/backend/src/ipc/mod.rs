//! Command channel between the watcher relay, the CLI and the processor.
//!
//! Every frame is one JSON object on its own line. Frames are fire-and-forget:
//! the processor never answers on the socket.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod client;

pub use client::CommandClient;

use crate::actor::events::IN_ISDIR;

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum IpcError {
  #[error("Ser/de error: {0}")]
  Serde(String),
  #[error("IO error: {0}")]
  Io(String),
  #[error("Processor shut down")]
  Shutdown,
  #[error("Connection error: {0}")]
  Connection(String),
  #[error("Codec error: {0}")]
  Codec(String),
}

impl From<serde_json::Error> for IpcError {
  fn from(err: serde_json::Error) -> Self {
    IpcError::Serde(err.to_string())
  }
}

impl From<std::io::Error> for IpcError {
  fn from(err: std::io::Error) -> Self {
    IpcError::Io(err.to_string())
  }
}

impl From<tokio_util::codec::LinesCodecError> for IpcError {
  fn from(err: tokio_util::codec::LinesCodecError) -> Self {
    IpcError::Codec(err.to_string())
  }
}

// ============================================================================
// Frames
// ============================================================================

/// A unit of work for the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Command {
  FilesystemEvent(FsEvent),
  RemoteCall(RemoteCall),
}

impl Command {
  /// Short label for logs
  pub fn describe(&self) -> String {
    match self {
      Command::FilesystemEvent(event) => format!("event {:#x} {}", event.mask, event.path.display()),
      Command::RemoteCall(RemoteCall::Complete { path }) => format!("complete {}", path.display()),
      Command::RemoteCall(RemoteCall::Delete { path }) => format!("delete {}", path.display()),
      Command::RemoteCall(RemoteCall::Move { src, dest }) => {
        format!("move {} -> {}", src.display(), dest.display())
      }
      Command::RemoteCall(RemoteCall::AutoAdopt { user_id }) => format!("auto_adopt {user_id}"),
    }
  }
}

/// A raw inotify-style notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsEvent {
  pub mask: u32,
  /// Pairs MOVED_FROM with MOVED_TO; only sent for move events
  pub cookie: Option<u32>,
  #[serde(default)]
  pub dir: bool,
  pub path: PathBuf,
}

impl FsEvent {
  pub fn new(mask: u32, path: impl Into<PathBuf>) -> Self {
    Self {
      mask,
      cookie: None,
      dir: mask & IN_ISDIR != 0,
      path: path.into(),
    }
  }

  pub fn with_cookie(mut self, cookie: u32) -> Self {
    self.cookie = Some(cookie);
    self
  }

  pub fn is_dir(&self) -> bool {
    self.dir || self.mask & IN_ISDIR != 0
  }
}

/// A named processor operation invoked from outside
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum RemoteCall {
  Complete { path: PathBuf },
  Delete { path: PathBuf },
  Move { src: PathBuf, dest: PathBuf },
  AutoAdopt { user_id: i64 },
}

impl RemoteCall {
  pub fn complete(path: &Path) -> Command {
    Command::RemoteCall(RemoteCall::Complete { path: path.to_path_buf() })
  }

  pub fn delete(path: &Path) -> Command {
    Command::RemoteCall(RemoteCall::Delete { path: path.to_path_buf() })
  }
}
