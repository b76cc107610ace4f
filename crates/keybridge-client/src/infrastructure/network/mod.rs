//! Socket clients for the bridge.
//!
//! - [`EventWatcher`] subscribes to the observer socket and yields decoded
//!   events.  It is async (tokio), so a watcher can sit in a `select!` next to
//!   a shutdown signal.
//! - [`KeySender`] connects to the kscan socket and writes one framed command
//!   per key transition.  It is blocking; presses are short and infrequent.

use std::path::PathBuf;

use keybridge_core::{DecodeError, EncodeError, FrameError};
use thiserror::Error;

pub mod sender;
pub mod watcher;

pub use sender::KeySender;
pub use watcher::EventWatcher;

/// Default observer socket path.
pub const DEFAULT_EVENTS_SOCKET: &str = "/tmp/zmk_ipc.sock";
/// Default kscan socket path.
pub const DEFAULT_KSCAN_SOCKET: &str = "/tmp/zmk_kscan_ipc.sock";

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket could not be reached.
    #[error("failed to connect to {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("received an undecodable event: {0}")]
    Decode(#[from] DecodeError),
    #[error("failed to encode command: {0}")]
    Encode(#[from] EncodeError),
}

impl ClientError {
    /// `true` when the bridge closed the connection.
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Frame(FrameError::PeerClosed))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Frame(FrameError::from_io(err))
    }
}
