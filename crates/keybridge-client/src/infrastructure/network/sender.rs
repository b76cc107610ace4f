//! Blocking kscan-socket command sender.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use keybridge_core::protocol::codec::encode_client_message_into;
use keybridge_core::protocol::framing::write_frame;
use keybridge_core::{ClientMessage, KeyAddress, KeyEvent, KeyPosition, MAX_CLIENT_MESSAGE_SIZE};
use tracing::{debug, info};

use super::ClientError;

pub struct KeySender {
    stream: UnixStream,
    path: PathBuf,
}

impl KeySender {
    /// Connects to the kscan socket at `path`.
    ///
    /// The bridge serves one client at a time; a second sender connects but
    /// is not read until the first disconnects.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] if nothing is listening.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).map_err(|source| ClientError::Connect {
            path: path.clone(),
            source,
        })?;
        info!("connected to {}", path.display());
        Ok(Self { stream, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one key event as a framed command.
    pub fn send(&mut self, event: KeyEvent) -> Result<(), ClientError> {
        let mut buf = [0u8; MAX_CLIENT_MESSAGE_SIZE];
        let len = encode_client_message_into(&ClientMessage::from(event), &mut buf)?;
        write_frame(&mut self.stream, &buf[..len], MAX_CLIENT_MESSAGE_SIZE)?;
        debug!("sent {:?}", event);
        Ok(())
    }

    pub fn send_key_press(&mut self, position: u32) -> Result<(), ClientError> {
        self.send(KeyEvent::press(KeyAddress::Position(position)))
    }

    pub fn send_key_release(&mut self, position: u32) -> Result<(), ClientError> {
        self.send(KeyEvent::release(KeyAddress::Position(position)))
    }

    pub fn send_key_press_rc(&mut self, row: u32, col: u32) -> Result<(), ClientError> {
        self.send(KeyEvent::press(KeyAddress::KeyPos(KeyPosition { row, col })))
    }

    pub fn send_key_release_rc(&mut self, row: u32, col: u32) -> Result<(), ClientError> {
        self.send(KeyEvent::release(KeyAddress::KeyPos(KeyPosition { row, col })))
    }

    /// Presses `address`, holds it for `hold`, then releases it.
    pub fn tap(&mut self, address: KeyAddress, hold: Duration) -> Result<(), ClientError> {
        self.send(KeyEvent::press(address))?;
        thread::sleep(hold);
        self.send(KeyEvent::release(address))
    }
}
