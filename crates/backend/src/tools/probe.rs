use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use tracing::warn;

use super::command_from;

/// Tells whether some process still has a file open (an upload in progress)
#[async_trait]
pub trait WriteProbe: Send + Sync {
  async fn in_use(&self, path: &Path) -> bool;
}

/// `fuser -s <path>`: exit 0 when any process has the file open
pub struct FuserProbe {
  command: String,
}

impl FuserProbe {
  pub fn new(command: &str) -> Self {
    Self {
      command: command.to_string(),
    }
  }
}

#[async_trait]
impl WriteProbe for FuserProbe {
  async fn in_use(&self, path: &Path) -> bool {
    let status = command_from(&self.command)
      .arg("-s")
      .arg(path)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .await;

    match status {
      Ok(status) => status.success(),
      Err(e) => {
        // without a probe every file is treated as finished
        warn!(command = %self.command, error = %e, "Write probe failed to run");
        false
      }
    }
  }
}
