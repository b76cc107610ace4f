//! Key-matrix input device fed by the command socket.
//!
//! The device follows the usual kscan driver contract: a consumer registers
//! one callback with [`KscanDevice::configure`], then turns delivery on and
//! off with [`KscanDevice::enable`] / [`KscanDevice::disable`].  Key events
//! arriving while disabled, or before a callback is registered, are dropped.
//!
//! The callback runs synchronously on the command server's reading thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use keybridge_core::MatrixCoordinate;
use thiserror::Error;

/// Receives `(row, col, pressed)` for every accepted key event.
pub type KeyCallback = Arc<dyn Fn(u32, u32, bool) + Send + Sync>;

/// Error type for device configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no key callback supplied")]
    MissingCallback,
}

/// What happened to a key event handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Disabled,
    NoCallback,
}

#[derive(Default)]
pub struct KscanDevice {
    callback: RwLock<Option<KeyCallback>>,
    enabled: AtomicBool,
}

impl KscanDevice {
    /// A disabled device with no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the key callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`DeviceError::MissingCallback`] when `callback` is `None`; the
    /// previous registration is left in place.
    pub fn configure(&self, callback: Option<KeyCallback>) -> Result<(), DeviceError> {
        let callback = callback.ok_or(DeviceError::MissingCallback)?;
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        Ok(())
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Invokes the callback for one key transition, if the device is enabled
    /// and configured.
    pub fn report(&self, coord: MatrixCoordinate, pressed: bool) -> Delivery {
        if !self.is_enabled() {
            return Delivery::Disabled;
        }
        // The lock is released before the call; callbacks may reconfigure.
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(cb) => {
                cb(coord.row, coord.col, pressed);
                Delivery::Delivered
            }
            None => Delivery::NoCallback,
        }
    }
}
