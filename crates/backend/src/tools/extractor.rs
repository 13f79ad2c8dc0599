use std::{
  path::{Path, PathBuf},
  process::Stdio,
};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::command_from;
use crate::domain::package::PackageInfo;

/// Exit status meaning "archive is damaged but `.PKGINFO` was readable"
const EXIT_PARTIAL: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
  #[error("Failed to run {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
  #[error("Not a readable package {path} (exit {code:?}): {stderr}")]
  Rejected {
    path: PathBuf,
    code: Option<i32>,
    stderr: String,
  },
  #[error("Invalid metadata for {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Extractor result: metadata plus whether the archive failed verification
#[derive(Debug, Clone)]
pub struct Extraction {
  pub info: PackageInfo,
  pub partial: bool,
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
  async fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// Runs `<command> <file> [-v]` and parses the JSON it prints
pub struct PkgInfoCommand {
  command: String,
  verify: bool,
}

impl PkgInfoCommand {
  pub fn new(command: &str, verify: bool) -> Self {
    Self {
      command: command.to_string(),
      verify,
    }
  }
}

#[async_trait]
impl MetadataExtractor for PkgInfoCommand {
  async fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
    let mut command = command_from(&self.command);
    command.arg(path);
    if self.verify {
      command.arg("-v");
    }

    trace!(command = %self.command, path = %path.display(), "Running metadata extractor");
    let output = command
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| ExtractError::Spawn {
        command: self.command.clone(),
        source,
      })?;

    let partial = match output.status.code() {
      Some(0) => false,
      Some(EXIT_PARTIAL) => {
        debug!(path = %path.display(), "Extractor reported a partial archive");
        true
      }
      code => {
        return Err(ExtractError::Rejected {
          path: path.to_path_buf(),
          code,
          stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
      }
    };

    let info = serde_json::from_slice(&output.stdout).map_err(|source| ExtractError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    Ok(Extraction { info, partial })
  }
}
