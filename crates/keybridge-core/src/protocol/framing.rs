//! Length-prefixed framing over byte streams.
//!
//! ```text
//! [len:4 big-endian][payload:len]
//! ```
//!
//! Each socket direction has its own maximum payload size (the largest
//! encoded message of that family).  A reader rejects a larger declared
//! length before touching the body, so a hostile peer cannot make it allocate.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Every way moving one frame can fail.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Local payload exceeds the direction's maximum; nothing was written.
    #[error("frame payload of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The peer announced a payload larger than the maximum.
    #[error("peer announced a {declared}-byte frame, maximum is {max}")]
    OversizedFrame { declared: usize, max: usize },

    /// End of stream or connection reset.
    #[error("peer closed the connection")]
    PeerClosed,

    /// A non-blocking send would have blocked.
    #[error("peer is not draining its socket")]
    Congested,

    /// The kernel accepted only part of the frame.
    #[error("short write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("socket I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl FrameError {
    /// Classifies an I/O error, folding disconnect kinds into
    /// [`FrameError::PeerClosed`].
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => FrameError::PeerClosed,
            io::ErrorKind::WouldBlock => FrameError::Congested,
            _ => FrameError::Io(err),
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        FrameError::from_io(err)
    }
}

/// Builds `[len][payload]` as one contiguous buffer.
///
/// # Errors
///
/// [`FrameError::FrameTooLarge`] when `payload.len() > max`.
pub fn encode_frame(payload: &[u8], max: usize) -> Result<Vec<u8>, FrameError> {
    if payload.len() > max {
        return Err(FrameError::FrameTooLarge {
            len: payload.len(),
            max,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::FrameTooLarge {
        len: payload.len(),
        max,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Completes a frame whose payload was encoded in place.
///
/// `buf` holds a `payload_len`-byte payload starting at
/// [`LENGTH_PREFIX_SIZE`]; the prefix is written in front of it and the whole
/// frame is returned.  Nothing is allocated.
///
/// # Errors
///
/// [`FrameError::FrameTooLarge`] when `payload_len > max` or the payload does
/// not fit in `buf`.
pub fn seal_frame(buf: &mut [u8], payload_len: usize, max: usize) -> Result<&[u8], FrameError> {
    let too_large = FrameError::FrameTooLarge {
        len: payload_len,
        max,
    };
    let end = LENGTH_PREFIX_SIZE + payload_len;
    if payload_len > max || end > buf.len() {
        return Err(too_large);
    }
    let len = u32::try_from(payload_len).map_err(|_| too_large)?;
    buf[..LENGTH_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
    Ok(&buf[..end])
}

/// Validates a received length prefix against `max`.
pub fn parse_length_prefix(prefix: [u8; LENGTH_PREFIX_SIZE], max: usize) -> Result<usize, FrameError> {
    let declared = u32::from_be_bytes(prefix) as usize;
    if declared > max {
        return Err(FrameError::OversizedFrame { declared, max });
    }
    Ok(declared)
}

/// Sends a frame with a single `write` attempt.
///
/// Meant for non-blocking sockets: a write that would block is
/// [`FrameError::Congested`] and a short write is
/// [`FrameError::PartialWrite`].  Neither is retried; the stream should be
/// considered unusable afterwards.
pub fn send_frame<W: Write>(w: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError> {
    let frame = encode_frame(payload, max)?;
    send_encoded_frame(w, &frame)
}

/// Like [`send_frame`] for a buffer already built by [`encode_frame`], so
/// one frame can be sent to many streams.
pub fn send_encoded_frame<W: Write>(w: &mut W, frame: &[u8]) -> Result<(), FrameError> {
    loop {
        match w.write(frame) {
            Ok(n) if n == frame.len() => return Ok(()),
            Ok(written) => {
                return Err(FrameError::PartialWrite {
                    written,
                    expected: frame.len(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::from_io(e)),
        }
    }
}

/// Sends a frame on a blocking stream, writing until done.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError> {
    let frame = encode_frame(payload, max)?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame.
///
/// # Errors
///
/// - [`FrameError::PeerClosed`] on end of stream, including mid-frame;
/// - [`FrameError::OversizedFrame`] if the prefix exceeds `max` (the body is
///   left unread);
/// - [`FrameError::Io`] for anything else.
pub fn recv_frame<R: Read>(r: &mut R, max: usize) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    r.read_exact(&mut prefix)?;
    let len = parse_length_prefix(prefix, max)?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
