//! Protocol-Buffers wire primitives used by the codec.
//!
//! Every field on the wire is a *key* followed by a value:
//!
//! ```text
//! key   = varint((field_number << 3) | wire_type)
//! value = varint                          (wire type 0)
//!       | 8 little-endian bytes           (wire type 1)
//!       | varint(len) + len bytes         (wire type 2)
//!       | 4 little-endian bytes           (wire type 5)
//! ```
//!
//! Varints store 7 bits per byte, least-significant group first, with the high
//! bit set on every byte except the last.  Because every field carries its own
//! type, a reader can skip fields it does not know about, which keeps old
//! readers compatible with newer writers.

use super::codec::{DecodeError, EncodeError};

/// Longest possible varint encoding (a full `u64`).
pub const MAX_VARINT_LEN: usize = 10;

/// Longest varint encoding of a `u32`.
pub const MAX_VARINT32_LEN: usize = 5;

/// The wire type carried in the low three bits of every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(()),
        }
    }
}

/// Number of bytes `value` occupies as a varint.
pub const fn varint_len(value: u64) -> usize {
    let mut len = 1;
    let mut rest = value >> 7;
    while rest != 0 {
        len += 1;
        rest >>= 7;
    }
    len
}

/// Largest field number a key can carry.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

// ── Writer ────────────────────────────────────────────────────────────────────

/// Appends wire-encoded fields to a caller-supplied fixed buffer.
///
/// Running out of room is reported as [`EncodeError::BufferTooSmall`] rather
/// than growing the buffer, so encoding never allocates.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    message: &'static str,
}

impl<'a> SliceWriter<'a> {
    /// `message` names the value being encoded, for error reporting.
    pub fn new(buf: &'a mut [u8], message: &'static str) -> Self {
        Self { buf, len: 0, message }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            return Err(EncodeError::BufferTooSmall {
                message: self.message,
                needed: end,
                capacity: self.buf.len(),
            });
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    pub fn put_varint(&mut self, mut value: u64) -> Result<(), EncodeError> {
        let mut tmp = [0u8; MAX_VARINT_LEN];
        let mut n = 0;
        loop {
            let low = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                tmp[n] = low;
                n += 1;
                break;
            }
            tmp[n] = low | 0x80;
            n += 1;
        }
        self.put_slice(&tmp[..n])
    }

    pub fn put_key(&mut self, field: u32, wire_type: WireType) -> Result<(), EncodeError> {
        self.put_varint((u64::from(field) << 3) | wire_type as u64)
    }

    /// Varint field, always written (oneof members carry presence).
    pub fn put_varint_field(&mut self, field: u32, value: u64) -> Result<(), EncodeError> {
        self.put_key(field, WireType::Varint)?;
        self.put_varint(value)
    }

    /// Unsigned scalar field; omitted when zero.
    pub fn put_uint_field(&mut self, field: u32, value: u64) -> Result<(), EncodeError> {
        if value == 0 {
            return Ok(());
        }
        self.put_varint_field(field, value)
    }

    /// `int32`/enum field; omitted when zero.  Negative values are
    /// sign-extended to 64 bits, so they always take ten bytes.
    pub fn put_int32_field(&mut self, field: u32, value: i32) -> Result<(), EncodeError> {
        self.put_uint_field(field, i64::from(value) as u64)
    }

    /// `bool` field; omitted when `false`.
    pub fn put_bool_field(&mut self, field: u32, value: bool) -> Result<(), EncodeError> {
        self.put_uint_field(field, u64::from(value))
    }

    /// `bytes` field; omitted when empty.
    pub fn put_bytes_field(&mut self, field: u32, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.put_length_delimited(field, bytes)
    }

    /// Embedded message field; always written, even when `encoded` is empty.
    pub fn put_length_delimited(&mut self, field: u32, encoded: &[u8]) -> Result<(), EncodeError> {
        self.put_key(field, WireType::LengthDelimited)?;
        self.put_varint(encoded.len() as u64)?;
        self.put_slice(encoded)
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Cursor over the fields of one encoded message.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads the next key, or `None` at the end of the message.
    ///
    /// # Errors
    ///
    /// Field number 0 (or one above 2^29 - 1) and wire types 6 and 7 are
    /// rejected.
    pub fn next_key(&mut self) -> Result<Option<(u32, WireType)>, DecodeError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let offset = self.pos;
        let key = self.read_varint()?;
        let field = key >> 3;
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(DecodeError::InvalidFieldNumber { offset });
        }
        let field = field as u32;
        let raw_type = (key & 0x07) as u8;
        let wire_type = WireType::try_from(raw_type).map_err(|_| DecodeError::UnsupportedWireType {
            field,
            wire_type: raw_type,
        })?;
        Ok(Some((field, wire_type)))
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(DecodeError::Truncated { offset: self.pos })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    /// Reads a length prefix and returns the slice it covers.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated { offset: self.pos })?;
        self.take(len)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { offset: self.buf.len() })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skips the value of a field the schema does not know.
    ///
    /// # Errors
    ///
    /// Group wire types are not supported and yield
    /// [`DecodeError::UnsupportedWireType`].
    pub fn skip(&mut self, field: u32, wire_type: WireType) -> Result<(), DecodeError> {
        tracing::trace!("skipping unknown field {field} ({wire_type:?})");
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
            WireType::StartGroup | WireType::EndGroup => Err(DecodeError::UnsupportedWireType {
                field,
                wire_type: wire_type as u8,
            }),
        }
    }
}

/// Fails with [`DecodeError::WireTypeMismatch`] unless `found == expected`.
pub fn expect_wire_type(
    message: &'static str,
    field: u32,
    expected: WireType,
    found: WireType,
) -> Result<(), DecodeError> {
    if found == expected {
        Ok(())
    } else {
        Err(DecodeError::WireTypeMismatch {
            message,
            field,
            expected,
            found,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
