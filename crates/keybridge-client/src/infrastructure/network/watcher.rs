//! Async observer-socket subscriber.

use std::path::{Path, PathBuf};

use keybridge_core::protocol::framing::{parse_length_prefix, LENGTH_PREFIX_SIZE};
use keybridge_core::{decode_event, Event, MAX_EVENT_SIZE};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ClientError;

#[derive(Debug)]
pub struct EventWatcher {
    stream: UnixStream,
    path: PathBuf,
}

impl EventWatcher {
    /// Connects to the observer socket at `path`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] if nothing is listening.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| ClientError::Connect {
                path: path.clone(),
                source,
            })?;
        info!("subscribed to {}", path.display());
        Ok(Self { stream, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next event.
    ///
    /// # Errors
    ///
    /// - `Frame(PeerClosed)` when the bridge closes the connection, including
    ///   when it evicts this subscriber;
    /// - `Frame(OversizedFrame)` for a prefix larger than any event;
    /// - `Decode` for a frame that is not a valid event.  The stream is still
    ///   in sync and the next call may succeed.
    pub async fn next_event(&mut self) -> Result<Event, ClientError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.stream.read_exact(&mut prefix).await?;
        let len = parse_length_prefix(prefix, MAX_EVENT_SIZE)?;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(decode_event(&payload)?)
    }

    /// Moves the watcher onto a task that forwards events on a channel.
    ///
    /// The task ends when the connection fails or the receiver is dropped.
    /// Its result is the error that ended it, or `None` after the receiver
    /// went away.
    pub fn spawn(mut self, capacity: usize) -> (mpsc::Receiver<Event>, JoinHandle<Option<ClientError>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(async move {
            loop {
                match self.next_event().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            debug!("event receiver dropped; watcher exiting");
                            return None;
                        }
                    }
                    Err(ClientError::Decode(e)) => debug!("skipping undecodable event: {e}"),
                    Err(e) => return Some(e),
                }
            }
        });
        (rx, handle)
    }
}
