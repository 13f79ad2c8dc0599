//! Handles for reaching a processor
//!
//! A processor is either running in this process or elsewhere behind its
//! management socket. Callers that only submit work (the watcher relay and
//! the reconciliation passes) go through [`ProcessorHandle`] and do not care
//! which.

use std::path::Path;

use super::processor::{Processor, ProcessorError};
use crate::{
  ipc::{Command, CommandClient, IpcError, RemoteCall},
  server::{CommandHandler, CommandSender},
};

#[derive(Clone)]
pub enum ProcessorHandle {
  /// Run commands inline, in the caller's task
  Local(Processor),
  /// Queue commands on this process's dispatcher
  Queue(CommandSender),
  /// Send commands to another process
  Remote(CommandClient),
}

impl ProcessorHandle {
  /// Submit one command.
  ///
  /// For `Local` this waits for the command to finish; otherwise it returns
  /// once the command is queued or written to the socket.
  pub async fn submit(&self, command: Command) -> Result<(), SendError> {
    match self {
      ProcessorHandle::Local(processor) => Ok(processor.handle(command).await?),
      ProcessorHandle::Queue(sender) => Ok(sender.send(command).await?),
      ProcessorHandle::Remote(client) => Ok(client.send(&command).await?),
    }
  }

  pub async fn complete(&self, path: &Path) -> Result<(), SendError> {
    self.submit(RemoteCall::complete(path)).await
  }

  pub async fn delete(&self, path: &Path) -> Result<(), SendError> {
    self.submit(RemoteCall::delete(path)).await
  }

  pub fn is_local(&self) -> bool {
    matches!(self, ProcessorHandle::Local(_))
  }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SendError {
  #[error(transparent)]
  Processor(#[from] ProcessorError),
  #[error(transparent)]
  Ipc(#[from] IpcError),
}
