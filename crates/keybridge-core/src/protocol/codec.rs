//! Encoder and decoder for the two message families.
//!
//! Messages use the Protocol-Buffers wire format (see [`super::wire`]).  Scalar
//! fields equal to their default are omitted; oneof members and embedded
//! `Endpoint` messages are always written.  Decoding skips unknown fields and
//! keeps the last occurrence of a repeated field.
//!
//! Encoding never allocates beyond the returned `Vec`: nested messages are
//! written into fixed stack buffers sized by the `MAX_*_SIZE` constants.

use thiserror::Error;

use crate::domain::endpoint::{Endpoint, TransportType};
use crate::protocol::messages::{
    ClientMessage, ClientPayload, Event, HidConsumerReport, HidKeyboardReport, KeyAction,
    KeyAddress, KeyEvent, KeyPosition, KscanEvent, CONSUMER_KEYS_CAPACITY, KEYBOARD_KEYS_CAPACITY,
    MAX_CLIENT_MESSAGE_SIZE, MAX_CONSUMER_REPORT_SIZE, MAX_ENDPOINT_SIZE, MAX_EVENT_SIZE,
    MAX_KEYBOARD_REPORT_SIZE, MAX_KEY_EVENT_SIZE, MAX_KEY_POSITION_SIZE, MAX_KSCAN_EVENT_SIZE,
};
#[cfg(feature = "pointing")]
use crate::protocol::messages::{HidMouseReport, MAX_MOUSE_REPORT_SIZE};
use crate::protocol::wire::{expect_wire_type, FieldReader, SliceWriter, WireType};

/// Errors raised while encoding a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The encoded form does not fit the fixed output buffer.
    #[error("{message} does not fit: need at least {needed} bytes, buffer holds {capacity}")]
    BufferTooSmall {
        message: &'static str,
        needed: usize,
        capacity: usize,
    },
}

/// Errors raised while decoding a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("varint at byte {offset} is longer than 10 bytes")]
    VarintOverflow { offset: usize },

    #[error("invalid field number in key at byte {offset}")]
    InvalidFieldNumber { offset: usize },

    #[error("field {field} uses unsupported wire type {wire_type}")]
    UnsupportedWireType { field: u32, wire_type: u8 },

    #[error("{message}.{field}: expected wire type {expected:?}, found {found:?}")]
    WireTypeMismatch {
        message: &'static str,
        field: u32,
        expected: WireType,
        found: WireType,
    },

    #[error("{message}.{field}: {len} bytes exceeds capacity {capacity}")]
    FieldTooLong {
        message: &'static str,
        field: u32,
        len: usize,
        capacity: usize,
    },

    #[error("{message}.{field}: value {value} out of range")]
    ValueOutOfRange {
        message: &'static str,
        field: u32,
        value: u64,
    },

    #[error("{message}.{field}: unknown enum value {value}")]
    UnknownEnumValue {
        message: &'static str,
        field: u32,
        value: i32,
    },

    /// An `Event` carried none of the known variants.
    #[error("event has no payload")]
    MissingPayload,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `event` into `buf`, returning the number of bytes written.
///
/// # Errors
///
/// [`EncodeError::BufferTooSmall`] if `buf` is shorter than the encoding.
/// A buffer of [`MAX_EVENT_SIZE`] bytes always suffices.
pub fn encode_event_into(event: &Event, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "Event");
    match event {
        Event::Kscan(e) => {
            let mut inner = [0u8; MAX_KSCAN_EVENT_SIZE];
            let n = encode_kscan_event(e, &mut inner)?;
            w.put_length_delimited(1, &inner[..n])?;
        }
        Event::Keyboard(r) => {
            let mut inner = [0u8; MAX_KEYBOARD_REPORT_SIZE];
            let n = encode_keyboard_report(r, &mut inner)?;
            w.put_length_delimited(2, &inner[..n])?;
        }
        Event::Consumer(r) => {
            let mut inner = [0u8; MAX_CONSUMER_REPORT_SIZE];
            let n = encode_consumer_report(r, &mut inner)?;
            w.put_length_delimited(3, &inner[..n])?;
        }
        #[cfg(feature = "pointing")]
        Event::Mouse(r) => {
            let mut inner = [0u8; MAX_MOUSE_REPORT_SIZE];
            let n = encode_mouse_report(r, &mut inner)?;
            w.put_length_delimited(4, &inner[..n])?;
        }
    }
    Ok(w.len())
}

/// Encodes `event` into a freshly allocated buffer.
///
/// # Examples
///
/// ```rust
/// use keybridge_core::protocol::codec::{decode_event, encode_event};
/// use keybridge_core::protocol::messages::{Event, KscanEvent};
///
/// let event = Event::Kscan(KscanEvent { source: 0, position: 7, pressed: true, timestamp: 1200 });
/// let bytes = encode_event(&event).unwrap();
/// assert_eq!(decode_event(&bytes).unwrap(), event);
/// ```
pub fn encode_event(event: &Event) -> Result<Vec<u8>, EncodeError> {
    let mut buf = [0u8; MAX_EVENT_SIZE];
    let n = encode_event_into(event, &mut buf)?;
    Ok(buf[..n].to_vec())
}

/// Decodes an observer event.
///
/// # Errors
///
/// Any malformed input yields a [`DecodeError`]; a well-formed message with
/// no known variant yields [`DecodeError::MissingPayload`].
pub fn decode_event(bytes: &[u8]) -> Result<Event, DecodeError> {
    let mut r = FieldReader::new(bytes);
    let mut event = None;
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                expect_wire_type("Event", field, WireType::LengthDelimited, wt)?;
                event = Some(Event::Kscan(decode_kscan_event(r.read_length_delimited()?)?));
            }
            2 => {
                expect_wire_type("Event", field, WireType::LengthDelimited, wt)?;
                event = Some(Event::Keyboard(decode_keyboard_report(
                    r.read_length_delimited()?,
                )?));
            }
            3 => {
                expect_wire_type("Event", field, WireType::LengthDelimited, wt)?;
                event = Some(Event::Consumer(decode_consumer_report(
                    r.read_length_delimited()?,
                )?));
            }
            #[cfg(feature = "pointing")]
            4 => {
                expect_wire_type("Event", field, WireType::LengthDelimited, wt)?;
                event = Some(Event::Mouse(decode_mouse_report(r.read_length_delimited()?)?));
            }
            _ => r.skip(field, wt)?,
        }
    }
    event.ok_or(DecodeError::MissingPayload)
}

/// Encodes a client message into `buf`, returning the number of bytes
/// written.  A buffer of [`MAX_CLIENT_MESSAGE_SIZE`] bytes always suffices.
pub fn encode_client_message_into(msg: &ClientMessage, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "ClientMessage");
    if let Some(ClientPayload::KeyEvent(e)) = &msg.payload {
        let mut inner = [0u8; MAX_KEY_EVENT_SIZE];
        let n = encode_key_event(e, &mut inner)?;
        w.put_length_delimited(1, &inner[..n])?;
    }
    Ok(w.len())
}

pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, EncodeError> {
    let mut buf = [0u8; MAX_CLIENT_MESSAGE_SIZE];
    let n = encode_client_message_into(msg, &mut buf)?;
    Ok(buf[..n].to_vec())
}

/// Decodes a client message.
///
/// Unlike [`decode_event`], an empty payload is not an error here: the
/// returned message has `payload: None` and the dispatcher decides.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, DecodeError> {
    let mut r = FieldReader::new(bytes);
    let mut msg = ClientMessage::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                expect_wire_type("ClientMessage", field, WireType::LengthDelimited, wt)?;
                let e = decode_key_event(r.read_length_delimited()?)?;
                msg.payload = Some(ClientPayload::KeyEvent(e));
            }
            _ => r.skip(field, wt)?,
        }
    }
    Ok(msg)
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn read_u32(r: &mut FieldReader<'_>, message: &'static str, field: u32, wt: WireType) -> Result<u32, DecodeError> {
    expect_wire_type(message, field, WireType::Varint, wt)?;
    let value = r.read_varint()?;
    u32::try_from(value).map_err(|_| DecodeError::ValueOutOfRange { message, field, value })
}

/// `int32` values travel sign-extended; the low 32 bits are the value.
fn read_i32(r: &mut FieldReader<'_>, message: &'static str, field: u32, wt: WireType) -> Result<i32, DecodeError> {
    expect_wire_type(message, field, WireType::Varint, wt)?;
    Ok(r.read_varint()? as i32)
}

fn read_bytes<'a>(
    r: &mut FieldReader<'a>,
    message: &'static str,
    field: u32,
    wt: WireType,
    capacity: usize,
) -> Result<&'a [u8], DecodeError> {
    expect_wire_type(message, field, WireType::LengthDelimited, wt)?;
    let bytes = r.read_length_delimited()?;
    if bytes.len() > capacity {
        return Err(DecodeError::FieldTooLong {
            message,
            field,
            len: bytes.len(),
            capacity,
        });
    }
    Ok(bytes)
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

fn encode_endpoint(ep: &Endpoint, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "Endpoint");
    w.put_int32_field(1, ep.transport as i32)?;
    w.put_uint_field(2, u64::from(ep.ble_profile_index))?;
    Ok(w.len())
}

fn put_endpoint(w: &mut SliceWriter<'_>, field: u32, ep: &Endpoint) -> Result<(), EncodeError> {
    let mut inner = [0u8; MAX_ENDPOINT_SIZE];
    let n = encode_endpoint(ep, &mut inner)?;
    w.put_length_delimited(field, &inner[..n])
}

fn decode_endpoint(bytes: &[u8]) -> Result<Endpoint, DecodeError> {
    const MSG: &str = "Endpoint";
    let mut r = FieldReader::new(bytes);
    let mut ep = Endpoint::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                let value = read_i32(&mut r, MSG, field, wt)?;
                ep.transport = TransportType::try_from(value).map_err(|value| {
                    DecodeError::UnknownEnumValue {
                        message: MSG,
                        field,
                        value,
                    }
                })?;
            }
            2 => ep.ble_profile_index = read_u32(&mut r, MSG, field, wt)?,
            _ => r.skip(field, wt)?,
        }
    }
    Ok(ep)
}

// ── Event variants ────────────────────────────────────────────────────────────

fn encode_kscan_event(e: &KscanEvent, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "KscanEvent");
    w.put_uint_field(1, u64::from(e.source))?;
    w.put_uint_field(2, u64::from(e.position))?;
    w.put_bool_field(3, e.pressed)?;
    w.put_uint_field(4, e.timestamp)?;
    Ok(w.len())
}

fn decode_kscan_event(bytes: &[u8]) -> Result<KscanEvent, DecodeError> {
    const MSG: &str = "KscanEvent";
    let mut r = FieldReader::new(bytes);
    let mut e = KscanEvent::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => e.source = read_u32(&mut r, MSG, field, wt)?,
            2 => e.position = read_u32(&mut r, MSG, field, wt)?,
            3 => {
                expect_wire_type(MSG, field, WireType::Varint, wt)?;
                e.pressed = r.read_varint()? != 0;
            }
            4 => {
                expect_wire_type(MSG, field, WireType::Varint, wt)?;
                e.timestamp = r.read_varint()?;
            }
            _ => r.skip(field, wt)?,
        }
    }
    Ok(e)
}

fn encode_keyboard_report(rep: &HidKeyboardReport, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "HidKeyboardReport");
    put_endpoint(&mut w, 1, &rep.endpoint)?;
    w.put_uint_field(2, u64::from(rep.modifiers))?;
    w.put_bytes_field(3, &rep.keys)?;
    Ok(w.len())
}

fn decode_keyboard_report(bytes: &[u8]) -> Result<HidKeyboardReport, DecodeError> {
    const MSG: &str = "HidKeyboardReport";
    let mut r = FieldReader::new(bytes);
    let mut rep = HidKeyboardReport::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                expect_wire_type(MSG, field, WireType::LengthDelimited, wt)?;
                rep.endpoint = decode_endpoint(r.read_length_delimited()?)?;
            }
            2 => {
                let value = read_u32(&mut r, MSG, field, wt)?;
                rep.modifiers = u8::try_from(value).map_err(|_| DecodeError::ValueOutOfRange {
                    message: MSG,
                    field,
                    value: u64::from(value),
                })?;
            }
            3 => {
                let keys = read_bytes(&mut r, MSG, field, wt, KEYBOARD_KEYS_CAPACITY)?;
                rep = HidKeyboardReport::truncating(rep.endpoint, rep.modifiers, keys);
            }
            _ => r.skip(field, wt)?,
        }
    }
    Ok(rep)
}

fn encode_consumer_report(rep: &HidConsumerReport, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "HidConsumerReport");
    put_endpoint(&mut w, 1, &rep.endpoint)?;
    w.put_bytes_field(2, &rep.keys)?;
    Ok(w.len())
}

fn decode_consumer_report(bytes: &[u8]) -> Result<HidConsumerReport, DecodeError> {
    const MSG: &str = "HidConsumerReport";
    let mut r = FieldReader::new(bytes);
    let mut rep = HidConsumerReport::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                expect_wire_type(MSG, field, WireType::LengthDelimited, wt)?;
                rep.endpoint = decode_endpoint(r.read_length_delimited()?)?;
            }
            2 => {
                let keys = read_bytes(&mut r, MSG, field, wt, CONSUMER_KEYS_CAPACITY)?;
                rep = HidConsumerReport::truncating(rep.endpoint, keys);
            }
            _ => r.skip(field, wt)?,
        }
    }
    Ok(rep)
}

#[cfg(feature = "pointing")]
fn encode_mouse_report(rep: &HidMouseReport, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "HidMouseReport");
    put_endpoint(&mut w, 1, &rep.endpoint)?;
    w.put_uint_field(2, u64::from(rep.buttons))?;
    w.put_int32_field(3, rep.dx)?;
    w.put_int32_field(4, rep.dy)?;
    w.put_int32_field(5, rep.scroll_x)?;
    w.put_int32_field(6, rep.scroll_y)?;
    Ok(w.len())
}

#[cfg(feature = "pointing")]
fn decode_mouse_report(bytes: &[u8]) -> Result<HidMouseReport, DecodeError> {
    const MSG: &str = "HidMouseReport";
    let mut r = FieldReader::new(bytes);
    let mut rep = HidMouseReport::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => {
                expect_wire_type(MSG, field, WireType::LengthDelimited, wt)?;
                rep.endpoint = decode_endpoint(r.read_length_delimited()?)?;
            }
            2 => rep.buttons = read_u32(&mut r, MSG, field, wt)?,
            3 => rep.dx = read_i32(&mut r, MSG, field, wt)?,
            4 => rep.dy = read_i32(&mut r, MSG, field, wt)?,
            5 => rep.scroll_x = read_i32(&mut r, MSG, field, wt)?,
            6 => rep.scroll_y = read_i32(&mut r, MSG, field, wt)?,
            _ => r.skip(field, wt)?,
        }
    }
    Ok(rep)
}

// ── Client message variants ───────────────────────────────────────────────────

fn encode_key_event(e: &KeyEvent, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut w = SliceWriter::new(buf, "KeyEvent");
    w.put_int32_field(1, e.action.to_wire())?;
    match e.address {
        Some(KeyAddress::KeyPos(pos)) => {
            let mut inner = [0u8; MAX_KEY_POSITION_SIZE];
            let mut pw = SliceWriter::new(&mut inner, "KeyPosition");
            pw.put_uint_field(1, u64::from(pos.row))?;
            pw.put_uint_field(2, u64::from(pos.col))?;
            let n = pw.len();
            w.put_length_delimited(2, &inner[..n])?;
        }
        Some(KeyAddress::Position(position)) => w.put_varint_field(3, u64::from(position))?,
        None => {}
    }
    Ok(w.len())
}

fn decode_key_event(bytes: &[u8]) -> Result<KeyEvent, DecodeError> {
    const MSG: &str = "KeyEvent";
    let mut r = FieldReader::new(bytes);
    let mut e = KeyEvent::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => e.action = KeyAction::from_wire(read_i32(&mut r, MSG, field, wt)?),
            2 => {
                expect_wire_type(MSG, field, WireType::LengthDelimited, wt)?;
                let pos = decode_key_position(r.read_length_delimited()?)?;
                e.address = Some(KeyAddress::KeyPos(pos));
            }
            3 => e.address = Some(KeyAddress::Position(read_u32(&mut r, MSG, field, wt)?)),
            _ => r.skip(field, wt)?,
        }
    }
    Ok(e)
}

fn decode_key_position(bytes: &[u8]) -> Result<KeyPosition, DecodeError> {
    const MSG: &str = "KeyPosition";
    let mut r = FieldReader::new(bytes);
    let mut pos = KeyPosition::default();
    while let Some((field, wt)) = r.next_key()? {
        match field {
            1 => pos.row = read_u32(&mut r, MSG, field, wt)?,
            2 => pos.col = read_u32(&mut r, MSG, field, wt)?,
            _ => r.skip(field, wt)?,
        }
    }
    Ok(pos)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
