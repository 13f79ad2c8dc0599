//! Processor and watcher relay commands

use std::{
  path::Path,
  process::{Command, Stdio},
};

use anyhow::{Context, Result};
use archrepo::{Daemon, config::Config};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Start the processor, detached unless `in_process` is set
pub async fn cmd_serve(config: Config, config_path: Option<&Path>, in_process: bool, watch: bool) -> Result<()> {
  if !in_process {
    let pid = spawn_detached(config_path, watch).context("Failed to start processor")?;
    println!("Processor started (PID {pid})");
    return Ok(());
  }

  let mut daemon = Daemon::new(config);
  if !watch {
    daemon = daemon.without_watcher();
  }
  daemon.run().await.context("Failed to run processor")?;
  Ok(())
}

/// Re-execute this binary as `serve --background`, with its own runtime
fn spawn_detached(config_path: Option<&Path>, watch: bool) -> std::io::Result<u32> {
  let exe = std::env::current_exe()?;

  let mut command = Command::new(&exe);
  command.arg("serve").arg("--background");
  if !watch {
    command.arg("--no-watch");
  }
  if let Some(path) = config_path {
    command.arg("--config").arg(path);
  }

  let child = command
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()?;

  info!(pid = child.id(), "Spawned processor");
  Ok(child.id())
}

/// Relay filesystem events to a running processor until ctrl-c
pub async fn cmd_watch(config: &Config) -> Result<()> {
  let cancel = CancellationToken::new();

  let cancel_for_signal = cancel.clone();
  tokio::spawn(async move {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "Failed to listen for ctrl-c");
      return;
    }
    cancel_for_signal.cancel();
  });

  archrepo::run_watch_relay(&config.repository, cancel)
    .await
    .context("Is the processor running? Start it with 'archrepo serve --no-watch'")?;
  Ok(())
}
