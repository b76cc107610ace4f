//! Message types carried on the two IPC sockets.
//!
//! The observer socket carries [`Event`]s from the device to any number of
//! watchers.  The kscan socket carries [`ClientMessage`]s from a single client
//! into the device's key matrix.  Both families are encoded with the
//! Protocol-Buffers wire format by [`super::codec`]; field numbers are listed
//! next to each field.

use crate::domain::endpoint::Endpoint;
use crate::domain::matrix::{AddressError, MatrixCoordinate, MatrixGeometry};

use super::wire::{varint_len, MAX_VARINT32_LEN, MAX_VARINT_LEN};

// ── Capacities ────────────────────────────────────────────────────────────────

/// Maximum number of key codes in a keyboard report.
pub const KEYBOARD_KEYS_CAPACITY: usize = 32;

/// Maximum number of usage codes in a consumer report.
pub const CONSUMER_KEYS_CAPACITY: usize = 12;

pub type KeyboardKeys = heapless::Vec<u8, KEYBOARD_KEYS_CAPACITY>;
pub type ConsumerKeys = heapless::Vec<u8, CONSUMER_KEYS_CAPACITY>;

/// Copies `min(len, N)` bytes of `src` into a bounded key buffer.
fn truncate_into<const N: usize>(src: &[u8]) -> heapless::Vec<u8, N> {
    src.iter().take(N).copied().collect()
}

// ── Outbound events ───────────────────────────────────────────────────────────

/// A raw key-switch transition reported by the matrix scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KscanEvent {
    /// Field 1.
    pub source: u32,
    /// Field 2.  Linear key position.
    pub position: u32,
    /// Field 3.
    pub pressed: bool,
    /// Field 4.  Uptime in milliseconds.
    pub timestamp: u64,
}

/// Keyboard HID report as sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HidKeyboardReport {
    /// Field 1.
    pub endpoint: Endpoint,
    /// Field 2.  Modifier bitmask.
    pub modifiers: u8,
    /// Field 3.  Raw key array (bitmap or 6KRO slots, depending on firmware).
    pub keys: KeyboardKeys,
}

impl HidKeyboardReport {
    /// Builds a report, keeping at most [`KEYBOARD_KEYS_CAPACITY`] bytes of
    /// `keys`.
    pub fn truncating(endpoint: Endpoint, modifiers: u8, keys: &[u8]) -> Self {
        Self {
            endpoint,
            modifiers,
            keys: truncate_into(keys),
        }
    }
}

/// Consumer-control HID report (media keys and the like).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HidConsumerReport {
    /// Field 1.
    pub endpoint: Endpoint,
    /// Field 2.
    pub keys: ConsumerKeys,
}

impl HidConsumerReport {
    /// Builds a report, keeping at most [`CONSUMER_KEYS_CAPACITY`] bytes of
    /// `keys`.
    pub fn truncating(endpoint: Endpoint, keys: &[u8]) -> Self {
        Self {
            endpoint,
            keys: truncate_into(keys),
        }
    }
}

/// Mouse HID report.
#[cfg(feature = "pointing")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidMouseReport {
    /// Field 1.
    pub endpoint: Endpoint,
    /// Field 2.  Button bitmask.
    pub buttons: u32,
    /// Field 3.
    pub dx: i32,
    /// Field 4.
    pub dy: i32,
    /// Field 5.
    pub scroll_x: i32,
    /// Field 6.
    pub scroll_y: i32,
}

/// One observer event.  Exactly one variant is present on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Field 1.
    Kscan(KscanEvent),
    /// Field 2.
    Keyboard(HidKeyboardReport),
    /// Field 3.
    Consumer(HidConsumerReport),
    /// Field 4.
    #[cfg(feature = "pointing")]
    Mouse(HidMouseReport),
}

impl Event {
    /// Short variant label, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Kscan(_) => "kscan",
            Event::Keyboard(_) => "keyboard",
            Event::Consumer(_) => "consumer",
            #[cfg(feature = "pointing")]
            Event::Mouse(_) => "mouse",
        }
    }
}

// ── Inbound commands ──────────────────────────────────────────────────────────

/// Press or release.  Unknown wire values are kept so the dispatcher can
/// reject them instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAction {
    #[default]
    Press,
    Release,
    Unrecognized(i32),
}

impl KeyAction {
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => KeyAction::Press,
            1 => KeyAction::Release,
            other => KeyAction::Unrecognized(other),
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            KeyAction::Press => 0,
            KeyAction::Release => 1,
            KeyAction::Unrecognized(value) => value,
        }
    }

    /// `Some(true)` for press, `Some(false)` for release, `None` otherwise.
    pub fn pressed(self) -> Option<bool> {
        match self {
            KeyAction::Press => Some(true),
            KeyAction::Release => Some(false),
            KeyAction::Unrecognized(_) => None,
        }
    }
}

/// Explicit matrix address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPosition {
    /// Field 1.
    pub row: u32,
    /// Field 2.
    pub col: u32,
}

/// How a key event names its switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAddress {
    /// Field 2 of `KeyEvent`.
    KeyPos(KeyPosition),
    /// Field 3 of `KeyEvent`.  Linear index.
    Position(u32),
}

impl KeyAddress {
    /// Resolves the address against the matrix geometry.
    ///
    /// # Errors
    ///
    /// A linear position with a zero column count cannot be resolved.
    pub fn resolve(&self, geometry: &MatrixGeometry) -> Result<MatrixCoordinate, AddressError> {
        match *self {
            KeyAddress::KeyPos(KeyPosition { row, col }) => Ok(MatrixCoordinate { row, col }),
            KeyAddress::Position(position) => geometry.resolve_position(position),
        }
    }
}

/// Injected key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEvent {
    /// Field 1.
    pub action: KeyAction,
    /// `None` when neither address field was present.
    pub address: Option<KeyAddress>,
}

impl KeyEvent {
    pub fn press(address: KeyAddress) -> Self {
        Self {
            action: KeyAction::Press,
            address: Some(address),
        }
    }

    pub fn release(address: KeyAddress) -> Self {
        Self {
            action: KeyAction::Release,
            address: Some(address),
        }
    }
}

/// The variants a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPayload {
    /// Field 1.
    KeyEvent(KeyEvent),
}

/// Envelope for everything sent on the kscan socket.
///
/// `payload` is `None` when the frame decoded cleanly but carried no known
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientMessage {
    pub payload: Option<ClientPayload>,
}

impl From<KeyEvent> for ClientMessage {
    fn from(event: KeyEvent) -> Self {
        Self {
            payload: Some(ClientPayload::KeyEvent(event)),
        }
    }
}

// ── Maximum encoded sizes ─────────────────────────────────────────────────────
//
// Every field number in the schema is below 16, so each key is one byte.

const fn submessage(inner: usize) -> usize {
    1 + varint_len(inner as u64) + inner
}

const fn const_max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Enum fields we emit are always small and non-negative.
const ENUM_FIELD: usize = 1 + 1;
const U32_FIELD: usize = 1 + MAX_VARINT32_LEN;
const I32_FIELD: usize = 1 + MAX_VARINT_LEN;

pub const MAX_ENDPOINT_SIZE: usize = ENUM_FIELD + U32_FIELD;

pub const MAX_KSCAN_EVENT_SIZE: usize = U32_FIELD + U32_FIELD + (1 + 1) + (1 + MAX_VARINT_LEN);

pub const MAX_KEYBOARD_REPORT_SIZE: usize =
    submessage(MAX_ENDPOINT_SIZE) + (1 + 2) + submessage(KEYBOARD_KEYS_CAPACITY);

pub const MAX_CONSUMER_REPORT_SIZE: usize =
    submessage(MAX_ENDPOINT_SIZE) + submessage(CONSUMER_KEYS_CAPACITY);

#[cfg(feature = "pointing")]
pub const MAX_MOUSE_REPORT_SIZE: usize = submessage(MAX_ENDPOINT_SIZE) + U32_FIELD + 4 * I32_FIELD;

#[cfg(feature = "pointing")]
const MAX_EVENT_BODY: usize = const_max(
    const_max(MAX_KSCAN_EVENT_SIZE, MAX_KEYBOARD_REPORT_SIZE),
    const_max(MAX_CONSUMER_REPORT_SIZE, MAX_MOUSE_REPORT_SIZE),
);

#[cfg(not(feature = "pointing"))]
const MAX_EVENT_BODY: usize = const_max(
    const_max(MAX_KSCAN_EVENT_SIZE, MAX_KEYBOARD_REPORT_SIZE),
    MAX_CONSUMER_REPORT_SIZE,
);

/// Largest encoded [`Event`]; the observer socket's frame limit.
pub const MAX_EVENT_SIZE: usize = submessage(MAX_EVENT_BODY);

pub const MAX_KEY_POSITION_SIZE: usize = U32_FIELD + U32_FIELD;

/// The action is an open enum, so an unrecognized negative value may need the
/// full ten bytes.
pub const MAX_KEY_EVENT_SIZE: usize = I32_FIELD + const_max(submessage(MAX_KEY_POSITION_SIZE), U32_FIELD);

/// Largest encoded [`ClientMessage`]; the kscan socket's frame limit.
pub const MAX_CLIENT_MESSAGE_SIZE: usize = submessage(MAX_KEY_EVENT_SIZE);
