use std::{
  path::{Path, PathBuf},
  process::Stdio,
};

use async_trait::async_trait;
use tracing::debug;

use super::command_from;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
  #[error("Failed to run {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{command} failed on {index} (exit {code:?}): {stderr}")]
  Failed {
    command: String,
    index: PathBuf,
    code: Option<i32>,
    stderr: String,
  },
}

/// Adds and removes single packages in a per-architecture index file.
///
/// Callers must not invoke this concurrently for the same index.
#[async_trait]
pub trait RepoIndexer: Send + Sync {
  async fn add(&self, index: &Path, package: &Path) -> Result<(), IndexerError>;
  async fn remove(&self, index: &Path, name: &str) -> Result<(), IndexerError>;
}

/// `repo-add` / `repo-remove`
pub struct RepoCommands {
  add: String,
  remove: String,
}

impl RepoCommands {
  pub fn new(add: &str, remove: &str) -> Self {
    Self {
      add: add.to_string(),
      remove: remove.to_string(),
    }
  }

  async fn run(&self, program: &str, index: &Path, arg: &std::ffi::OsStr) -> Result<(), IndexerError> {
    debug!(command = %program, index = %index.display(), arg = ?arg, "Updating repository index");
    let output = command_from(program)
      .arg(index)
      .arg(arg)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| IndexerError::Spawn {
        command: program.to_string(),
        source,
      })?;

    if output.status.success() {
      Ok(())
    } else {
      Err(IndexerError::Failed {
        command: program.to_string(),
        index: index.to_path_buf(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      })
    }
  }
}

#[async_trait]
impl RepoIndexer for RepoCommands {
  async fn add(&self, index: &Path, package: &Path) -> Result<(), IndexerError> {
    self.run(&self.add, index, package.as_os_str()).await
  }

  async fn remove(&self, index: &Path, name: &str) -> Result<(), IndexerError> {
    self.run(&self.remove, index, std::ffi::OsStr::new(name)).await
  }
}
