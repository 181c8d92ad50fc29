//! WebSocket frame model and codec for the client side of RFC 6455.
//!
//! This crate owns the wire representation used by `hass-ws`. Encoding always
//! produces one complete frame; decoding works on any blocking [`Read`], and
//! [`read_text`] answers control frames on the same stream so callers only
//! ever see data payloads.

use std::io::{self, Read, Write};

/// Largest payload (single frame or reassembled message) accepted on decode.
pub const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD_LEN: u64 = 125;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0F;
const LENGTH_BITS: u8 = 0x7F;
const MAX_SHORT_LEN: u8 = 125;
const LEN_16_ESCAPE: u8 = 126;
const LEN_64_ESCAPE: u8 = 127;

/// Error returned by the frame readers and writers.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying stream failed for a reason other than EOF.
    #[error("stream i/o failed: {0}")]
    Io(#[source] io::Error),
    /// The peer closed the stream mid-frame or sent a close frame.
    #[error("connection closed")]
    ConnectionClosed,
    /// The opcode nibble is one of the reserved values.
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
    /// A control frame declared a payload above 125 bytes.
    #[error("control frame payload too long: {0} bytes")]
    ControlFrameTooLong(u64),
    /// A frame or reassembled message exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u64),
    /// A data message did not decode as UTF-8 text.
    #[error("text payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl From<io::Error> for CodecError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed
        } else {
            Self::Io(error)
        }
    }
}

/// Purpose of a frame, carried in the low nibble of the first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    /// Convert opcode into its wire nibble.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Parse an opcode from its wire nibble.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidOpcode`] for reserved values.
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(CodecError::InvalidOpcode(other)),
        }
    }

    /// Control frames (close, ping, pong) may not be fragmented or exceed 125 bytes.
    #[must_use]
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A single WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    pub opcode: Opcode,
    /// Whether the payload is (or was, on decode) masked on the wire.
    pub masked: bool,
    /// Unmasked payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a complete, masked client frame.
    #[must_use]
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: true,
            payload,
        }
    }

    /// Build a text frame from a UTF-8 string.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, text.into().into_bytes())
    }

    /// Build a close frame with an empty payload.
    #[must_use]
    pub fn close() -> Self {
        Self::new(Opcode::Close, Vec::new())
    }

    /// Build a pong echoing a ping payload.
    #[must_use]
    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(Opcode::Pong, payload)
    }
}

/// Encode a frame into wire bytes.
///
/// Masked frames get a fresh random key from the thread-local CSPRNG.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    if frame.masked {
        encode(frame, Some(rand::random::<[u8; 4]>()))
    } else {
        encode(frame, None)
    }
}

/// Encode a frame with a caller-chosen mask key, ignoring `frame.masked`.
#[must_use]
pub fn encode_frame_with_mask(frame: &Frame, mask: [u8; 4]) -> Vec<u8> {
    encode(frame, Some(mask))
}

/// XOR `buf` in place with `mask`, position modulo 4. Applying it twice restores the input.
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (index, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[index % 4];
    }
}

fn encode(frame: &Frame, mask: Option<[u8; 4]>) -> Vec<u8> {
    let len = frame.payload.len();
    let mut out = Vec::with_capacity(len + 14);

    let fin = if frame.fin { FIN_BIT } else { 0 };
    out.push(fin | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    if let Ok(short) = u8::try_from(len)
        && short <= MAX_SHORT_LEN
    {
        out.push(mask_bit | short);
    } else if let Ok(medium) = u16::try_from(len) {
        out.push(mask_bit | LEN_16_ESCAPE);
        out.extend_from_slice(&medium.to_be_bytes());
    } else {
        out.push(mask_bit | LEN_64_ESCAPE);
        out.extend_from_slice(&u64::try_from(len).unwrap_or(u64::MAX).to_be_bytes());
    }

    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.extend_from_slice(&frame.payload),
    }
    out
}

/// Read exactly one frame from a blocking reader.
///
/// Short reads are retried until the frame is complete.
///
/// # Errors
///
/// Returns [`CodecError::ConnectionClosed`] when the stream ends mid-frame,
/// [`CodecError::InvalidOpcode`] for reserved opcodes, and
/// [`CodecError::ControlFrameTooLong`] / [`CodecError::PayloadTooLarge`] for
/// oversize length fields.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, CodecError> {
    let mut header = [0_u8; 2];
    reader.read_exact(&mut header)?;

    let fin = header[0] & FIN_BIT != 0;
    let opcode = Opcode::from_u8(header[0] & OPCODE_BITS)?;
    let masked = header[1] & MASK_BIT != 0;

    let len = match header[1] & LENGTH_BITS {
        LEN_16_ESCAPE => {
            let mut ext = [0_u8; 2];
            reader.read_exact(&mut ext)?;
            u64::from(u16::from_be_bytes(ext))
        }
        LEN_64_ESCAPE => {
            let mut ext = [0_u8; 8];
            reader.read_exact(&mut ext)?;
            u64::from_be_bytes(ext)
        }
        short => u64::from(short),
    };

    if opcode.is_control() && len > MAX_CONTROL_PAYLOAD_LEN {
        return Err(CodecError::ControlFrameTooLong(len));
    }
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(len));
    }

    let mask = if masked {
        let mut key = [0_u8; 4];
        reader.read_exact(&mut key)?;
        Some(key)
    } else {
        None
    };

    let size = usize::try_from(len).map_err(|_| CodecError::PayloadTooLarge(len))?;
    let mut payload = vec![0_u8; size];
    reader.read_exact(&mut payload)?;
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin,
        opcode,
        masked,
        payload,
    })
}

/// Encode and write one frame, flushing the writer.
///
/// # Errors
///
/// Returns [`CodecError::Io`] when the write fails.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), CodecError> {
    writer.write_all(&encode_frame(frame))?;
    writer.flush()?;
    Ok(())
}

/// Read the next data message as text, answering control frames inline.
///
/// - ping: a pong echoing the payload is written before reading on.
/// - pong: skipped.
/// - close: fails with [`CodecError::ConnectionClosed`] without reading further.
/// - text/binary/continuation: fragments are joined until a FIN frame arrives.
///
/// # Errors
///
/// Any [`read_frame`] error, a failed pong write, an oversize reassembled
/// message, or [`CodecError::InvalidUtf8`].
pub fn read_text<S: Read + Write>(stream: &mut S) -> Result<String, CodecError> {
    let mut message = Vec::new();
    loop {
        let frame = read_frame(stream)?;
        match frame.opcode {
            Opcode::Close => {
                tracing::debug!(code = ?close_code(&frame.payload), "peer sent close frame");
                return Err(CodecError::ConnectionClosed);
            }
            Opcode::Ping => {
                tracing::trace!(len = frame.payload.len(), "answering ping");
                write_frame(stream, &Frame::pong(frame.payload))?;
            }
            Opcode::Pong => {
                tracing::trace!(len = frame.payload.len(), "ignoring unsolicited pong");
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                let total = message.len().saturating_add(frame.payload.len());
                let total = u64::try_from(total).unwrap_or(u64::MAX);
                if total > MAX_PAYLOAD_LEN {
                    return Err(CodecError::PayloadTooLarge(total));
                }
                message.extend_from_slice(&frame.payload);
                if frame.fin {
                    return Ok(String::from_utf8(message)?);
                }
                tracing::trace!(buffered = message.len(), "awaiting continuation frame");
            }
        }
    }
}

/// Status code from a close frame payload, if one was sent.
fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
