//! Byte-level reader and writer for the lobby wire format.
//!
//! Every multi-byte integer is little-endian. On top of the fixed-width
//! primitives the format has three composite shapes:
//!
//! - **packed integer**: 7 bits per byte, low group first, high bit set on
//!   every byte except the last (at most 5 bytes for 32 bits);
//! - **text / bytes-and-size**: a packed length followed by that many bytes;
//! - **nested message**: `[body length: u16][tag: u8][body]`, where the
//!   length counts only the body.

use crate::ProtocolError;

/// Largest body a nested message can carry.
pub const MAX_MESSAGE_BODY: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// MessageWriter
// ---------------------------------------------------------------------------

/// Appends wire values to a growable buffer.
///
/// Nested messages are opened with [`start_message`](Self::start_message)
/// and closed with [`end_message`](Self::end_message); the length prefix is
/// back-filled on close, so messages can nest arbitrarily.
#[derive(Debug, Default, Clone)]
pub struct MessageWriter {
    buf: Vec<u8>,
    message_starts: Vec<usize>,
}

impl MessageWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes `value` as a packed (7-bit group) integer.
    pub fn write_packed_u32(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Writes a packed byte length followed by the UTF-8 bytes.
    pub fn write_str(&mut self, value: &str) {
        self.write_bytes_and_size(value.as_bytes());
    }

    /// Writes a packed length followed by the raw bytes.
    pub fn write_bytes_and_size(&mut self, value: &[u8]) {
        // Lengths above u32::MAX cannot come out of a single datagram.
        self.write_packed_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
    }

    /// Writes raw bytes with no prefix.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Opens a nested message with the given tag.
    pub fn start_message(&mut self, tag: u8) {
        self.message_starts.push(self.buf.len());
        self.buf.extend_from_slice(&[0, 0]);
        self.buf.push(tag);
    }

    /// Closes the innermost open message, filling in its length.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] if no message is open or the body
    /// is longer than [`MAX_MESSAGE_BODY`].
    pub fn end_message(&mut self) -> Result<(), ProtocolError> {
        let start = self.message_starts.pop().ok_or_else(|| {
            ProtocolError::InvalidMessage("end_message without start_message".into())
        })?;
        let body_len = self.buf.len() - start - 3;
        let body_len = u16::try_from(body_len).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "message body of {body_len} bytes exceeds {MAX_MESSAGE_BODY}"
            ))
        })?;
        self.buf[start..start + 2].copy_from_slice(&body_len.to_le_bytes());
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finishes writing and returns the buffer.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] if a nested message is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>, ProtocolError> {
        if !self.message_starts.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} nested message(s) left open",
                self.message_starts.len()
            )));
        }
        Ok(self.buf)
    }
}

// ---------------------------------------------------------------------------
// MessageReader
// ---------------------------------------------------------------------------

/// A forward-only cursor over an immutable byte slice.
///
/// Reads never panic: running out of bytes yields
/// [`ProtocolError::TruncatedMessage`] and leaves the cursor where it was.
#[derive(Debug, Clone, Copy)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::TruncatedMessage {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.read_array().map(f32::from_le_bytes)
    }

    /// Reads a packed (7-bit group) integer.
    pub fn read_packed_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut probe = *self;
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = probe.read_u8()?;
            if shift == 28 && byte > 0x0F {
                return Err(ProtocolError::InvalidMessage(
                    "packed integer overflows 32 bits".into(),
                ));
            }
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                *self = probe;
                return Ok(value);
            }
        }
        Err(ProtocolError::InvalidMessage(
            "packed integer longer than 5 bytes".into(),
        ))
    }

    /// Reads a packed length followed by that many raw bytes.
    pub fn read_bytes_and_size(&mut self) -> Result<&'a [u8], ProtocolError> {
        let mut probe = *self;
        let len = probe.read_packed_u32()? as usize;
        let bytes = probe.read_bytes(len)?;
        *self = probe;
        Ok(bytes)
    }

    /// Reads packed-length-prefixed UTF-8 text.
    pub fn read_str(&mut self) -> Result<&'a str, ProtocolError> {
        let mut probe = *self;
        let bytes = probe.read_bytes_and_size()?;
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ProtocolError::InvalidMessage(format!("text is not UTF-8: {e}"))
        })?;
        *self = probe;
        Ok(text)
    }

    /// Reads one nested message, returning its tag and a reader over its
    /// body.
    pub fn read_message(&mut self) -> Result<(u8, MessageReader<'a>), ProtocolError> {
        let mut probe = *self;
        let len = probe.read_u16()? as usize;
        let tag = probe.read_u8()?;
        let body = probe.read_bytes(len)?;
        *self = probe;
        Ok((tag, MessageReader::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_little_endian() {
        let mut w = MessageWriter::new();
        w.write_u16(0x0102);
        w.write_i32(-2);
        w.write_u32(0x0A0B0C0D);
        assert_eq!(
            w.as_bytes(),
            &[0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF, 0x0D, 0x0C, 0x0B, 0x0A]
        );
    }

    #[test]
    fn test_floats_and_bools() {
        let mut w = MessageWriter::new();
        w.write_f32(1.5);
        w.write_bool(true);
        w.write_bool(false);
        assert_eq!(w.as_bytes(), &[0x00, 0x00, 0xC0, 0x3F, 0x01, 0x00]);

        let mut r = MessageReader::new(w.as_bytes());
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert!(r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
        assert!(r.is_empty());
        assert!(r.read_bool().is_err());
    }

    #[test]
    fn test_packed_integer_layout() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
            (u32::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];
        for (value, bytes) in cases {
            let mut w = MessageWriter::new();
            w.write_packed_u32(*value);
            assert_eq!(w.as_bytes(), *bytes, "encoding {value}");
            let mut r = MessageReader::new(bytes);
            assert_eq!(r.read_packed_u32().unwrap(), *value, "decoding {value}");
            assert!(r.is_empty());
        }
    }

    #[test]
    fn test_packed_integer_rejects_overflow() {
        let mut r = MessageReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(matches!(
            r.read_packed_u32(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut w = MessageWriter::new();
        w.write_str("Alice");
        assert_eq!(w.as_bytes(), b"\x05Alice");
    }

    #[test]
    fn test_nested_message_backfills_length() {
        let mut w = MessageWriter::new();
        w.start_message(7);
        w.write_i32(1);
        w.start_message(0);
        w.end_message().unwrap();
        w.end_message().unwrap();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(bytes, vec![7, 0, 7, 1, 0, 0, 0, 0, 0, 0]);

        let mut r = MessageReader::new(&bytes);
        let (tag, mut body) = r.read_message().unwrap();
        assert_eq!(tag, 7);
        assert_eq!(body.read_i32().unwrap(), 1);
        let (inner_tag, inner) = body.read_message().unwrap();
        assert_eq!(inner_tag, 0);
        assert!(inner.is_empty());
        assert!(r.is_empty());
    }

    #[test]
    fn test_unbalanced_messages_are_errors() {
        let mut w = MessageWriter::new();
        assert!(w.end_message().is_err());
        w.start_message(1);
        assert!(w.into_bytes().is_err());
    }

    #[test]
    fn test_truncated_read_leaves_cursor_in_place() {
        let mut r = MessageReader::new(&[1, 2, 3]);
        let err = r.read_i32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedMessage {
                needed: 4,
                remaining: 3
            }
        );
        assert_eq!(r.remaining(), 3);
        assert_eq!(r.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_bytes_and_size_truncated_does_not_consume_length() {
        let mut r = MessageReader::new(&[4, 127, 0]);
        assert!(matches!(
            r.read_bytes_and_size(),
            Err(ProtocolError::TruncatedMessage { needed: 4, remaining: 2 })
        ));
        assert_eq!(r.remaining(), 3);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut r = MessageReader::new(&[2, 0xC3, 0x28]);
        assert!(matches!(
            r.read_str(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
