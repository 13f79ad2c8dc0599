use std::{path::Path, sync::Arc};

use futures::SinkExt;
use tokio::{net::UnixStream, sync::Mutex};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

use super::{Command, IpcError};

/// Sends commands to a running processor over its management socket.
#[derive(Clone)]
pub struct CommandClient {
  framed: Arc<Mutex<Framed<UnixStream, LinesCodec>>>,
}

impl CommandClient {
  pub async fn connect(socket_path: &Path) -> Result<Self, IpcError> {
    let stream = UnixStream::connect(socket_path)
      .await
      .map_err(|e| IpcError::Connection(format!("{}: {e}", socket_path.display())))?;
    Ok(Self {
      framed: Arc::new(Mutex::new(Framed::new(stream, LinesCodec::new()))),
    })
  }

  /// Write one frame. Returns once the frame is flushed to the socket.
  pub async fn send(&self, command: &Command) -> Result<(), IpcError> {
    let json = serde_json::to_string(command)?;
    trace!(frame = %json, "Sending command");
    self.framed.lock().await.send(json).await?;
    Ok(())
  }
}
