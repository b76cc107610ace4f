//! Command ingestion server for the kscan socket.
//!
//! One client at a time injects key events.  The server thread alternates
//! between two states:
//!
//! ```text
//!        accept                       recv_frame ok
//! Disconnected ──────► Connected ◄────────────────┐
//!      ▲                   │                      │
//!      └───────────────────┘ peer closed /        │
//!        oversized frame / I/O error    decode ───┘
//! ```
//!
//! Each frame holds one [`ClientMessage`].  A frame that fails to decode, or a
//! command that cannot be resolved, is discarded and the connection stays
//! open.  An oversized length prefix closes the connection, since the stream
//! can no longer be resynchronised.
//!
//! Accepted commands are resolved to a matrix coordinate and passed to the
//! [`KscanDevice`] on the server thread.

use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use keybridge_core::protocol::framing::recv_frame;
use keybridge_core::{
    decode_client_message, AddressError, ClientMessage, ClientPayload, FrameError, KeyAction,
    MatrixCoordinate, MatrixGeometry, MAX_CLIENT_MESSAGE_SIZE,
};
use tracing::{debug, info, trace, warn};

use super::{
    accept_until_stopped, bind_listener, join_worker, remove_socket_file, ListenError, ListenerWaker,
};
use crate::application::kscan_device::{Delivery, KscanDevice};
use crate::infrastructure::storage::config::KscanConfig;

const THREAD_NAME: &str = "keybridge-kscan";

/// Result of dispatching one decoded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Delivered { coord: MatrixCoordinate, pressed: bool },
    /// Resolved, but the device is disabled.
    Disabled,
    /// Resolved, but no callback is registered.
    NoCallback,
    MissingPayload,
    UnrecognizedAction(i32),
    MissingAddress,
    Unresolvable(AddressError),
}

/// Resolves a command and hands it to the device.
pub fn dispatch_message(
    msg: &ClientMessage,
    geometry: &MatrixGeometry,
    device: &KscanDevice,
) -> CommandOutcome {
    let Some(ClientPayload::KeyEvent(event)) = msg.payload else {
        return CommandOutcome::MissingPayload;
    };
    let pressed = match event.action {
        KeyAction::Press => true,
        KeyAction::Release => false,
        KeyAction::Unrecognized(value) => return CommandOutcome::UnrecognizedAction(value),
    };
    let Some(address) = event.address else {
        return CommandOutcome::MissingAddress;
    };
    let coord = match address.resolve(geometry) {
        Ok(coord) => coord,
        Err(e) => return CommandOutcome::Unresolvable(e),
    };
    match device.report(coord, pressed) {
        Delivery::Delivered => CommandOutcome::Delivered { coord, pressed },
        Delivery::Disabled => CommandOutcome::Disabled,
        Delivery::NoCallback => CommandOutcome::NoCallback,
    }
}

/// The running kscan server.
pub struct CommandServer {
    running: Arc<AtomicBool>,
    socket_path: PathBuf,
    /// Second handle on the current connection, used to unblock the reader.
    held: Arc<Mutex<Option<UnixStream>>>,
    waker: ListenerWaker,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandServer {
    /// Binds the configured socket and starts serving `device`.
    ///
    /// # Errors
    ///
    /// Any [`ListenError`]; the server does not start.
    pub fn start(config: &KscanConfig, device: Arc<KscanDevice>) -> Result<Self, ListenError> {
        let listener = bind_listener(&config.socket_path)?;
        Self::start_with_listener(listener, &config.socket_path, config.geometry(), device)
    }

    pub fn start_with_listener(
        listener: UnixListener,
        socket_path: &Path,
        geometry: MatrixGeometry,
        device: Arc<KscanDevice>,
    ) -> Result<Self, ListenError> {
        let running = Arc::new(AtomicBool::new(true));
        let held = Arc::new(Mutex::new(None));
        let waker = ListenerWaker::new(&listener, socket_path)?;

        let worker = {
            let running = Arc::clone(&running);
            let held = Arc::clone(&held);
            std::thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || serve(listener, geometry, device, running, held))
                .map_err(|source| ListenError::SpawnFailed {
                    name: THREAD_NAME,
                    source,
                })?
        };

        info!(
            "kscan listening on {} ({}x{} matrix)",
            socket_path.display(),
            geometry.rows,
            geometry.columns
        );
        Ok(Self {
            running,
            socket_path: socket_path.to_path_buf(),
            held,
            waker,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `true` while a client connection is held.
    pub fn is_connected(&self) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Disconnects the client, stops accepting and removes the socket file.
    /// Calling it again does nothing.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(stream) = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.waker.wake();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            join_worker(handle, THREAD_NAME);
        }
        remove_socket_file(&self.socket_path);
        info!("kscan stopped");
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    listener: UnixListener,
    geometry: MatrixGeometry,
    device: Arc<KscanDevice>,
    running: Arc<AtomicBool>,
    held: Arc<Mutex<Option<UnixStream>>>,
) {
    while let Some(stream) = accept_until_stopped(&listener, &running, THREAD_NAME) {
        info!("kscan client connected");
        match stream.try_clone() {
            Ok(clone) => *held.lock().unwrap_or_else(PoisonError::into_inner) = Some(clone),
            Err(e) => warn!("failed to clone kscan connection: {e}"),
        }
        // Checked after publishing the handle: `stop` either sees it or we
        // see the cleared flag.
        if running.load(Ordering::Acquire) {
            read_commands(stream, &geometry, &device);
        }
        *held.lock().unwrap_or_else(PoisonError::into_inner) = None;
        info!("kscan client disconnected");
    }
    debug!("{THREAD_NAME} accept loop exited");
}

/// Reads and dispatches frames until the connection ends.
fn read_commands(mut stream: UnixStream, geometry: &MatrixGeometry, device: &KscanDevice) {
    loop {
        let frame = match recv_frame(&mut stream, MAX_CLIENT_MESSAGE_SIZE) {
            Ok(frame) => frame,
            Err(FrameError::PeerClosed) => return,
            Err(e) => {
                warn!("closing kscan connection: {e}");
                return;
            }
        };
        let msg = match decode_client_message(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("discarding undecodable kscan frame: {e}");
                continue;
            }
        };
        match dispatch_message(&msg, geometry, device) {
            CommandOutcome::Delivered { coord, pressed } => {
                trace!("key ({}, {}) pressed={pressed}", coord.row, coord.col);
            }
            CommandOutcome::Disabled | CommandOutcome::NoCallback => {
                debug!("kscan device not ready; key event dropped");
            }
            CommandOutcome::MissingPayload => warn!("kscan message without payload"),
            CommandOutcome::UnrecognizedAction(value) => {
                warn!("kscan key event with unknown action {value}")
            }
            CommandOutcome::MissingAddress => warn!("kscan key event without address"),
            CommandOutcome::Unresolvable(e) => warn!("kscan key event dropped: {e}"),
        }
    }
}
