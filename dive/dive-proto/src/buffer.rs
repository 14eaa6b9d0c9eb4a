//! Byte Buffer & Codec (C1): length-prefixed, big-endian encoding over a
//! growable byte vector, plus cursor-based readers over an immutable slice.
//!
//! Everything on the wire is big-endian (network byte order), independent of
//! host endianness — this keeps the protocol debuggable with generic packet
//! tools even though every Dive host is little-endian in practice.

use bytes::{BufMut, BytesMut};

use crate::error::{DiveError, Result};

/// An append-only, growable byte buffer used to build up an encoded message.
#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    inner: BytesMut,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self {
            inner: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.inner.to_vec()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.inner.put_u8(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.inner.put_u32(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.inner.put_u64(v);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.put_slice(bytes);
    }

    /// Emits `write_u32(byte_length(s))` followed by the raw UTF-8 bytes.
    /// The length is the byte length, not the code-point count, and no NUL
    /// terminator is implied.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }
}

/// Reads a `u8` at `offset`, advancing it by 1.
pub fn read_u8(buf: &[u8], offset: &mut usize) -> Result<u8> {
    let bytes = read_bytes(buf, offset, 1)?;
    Ok(bytes[0])
}

/// Reads a big-endian `u32` at `offset`, advancing it by 4.
pub fn read_u32(buf: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes(buf, offset, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

/// Reads a big-endian `u64` at `offset`, advancing it by 8.
pub fn read_u64(buf: &[u8], offset: &mut usize) -> Result<u64> {
    let bytes = read_bytes(buf, offset, 8)?;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

/// Reads `len` raw bytes at `offset`, advancing it by `len`. Fails with
/// `OutOfRange` if `len` bytes are not available.
pub fn read_bytes<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start
        .checked_add(len)
        .ok_or_else(|| DiveError::out_of_range("offset overflow"))?;
    if end > buf.len() {
        return Err(DiveError::out_of_range(format!(
            "short read: need {} bytes at offset {}, have {}",
            len,
            start,
            buf.len()
        )));
    }
    *offset = end;
    Ok(&buf[start..end])
}

/// Reads a length-prefixed UTF-8 string at `offset`. Fails with
/// `OutOfRange` if the declared length exceeds the remaining buffer, or if
/// the bytes are not valid UTF-8.
pub fn read_string(buf: &[u8], offset: &mut usize) -> Result<String> {
    let len = read_u32(buf, offset)? as usize;
    let bytes = read_bytes(buf, offset, len)?;
    String::from_utf8(bytes.to_vec()).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trip() {
        for v in [0u32, 1, 42, u32::MAX, 0x1020_3040] {
            let mut buf = ByteBuffer::new();
            buf.write_u32(v);
            let mut offset = 0;
            assert_eq!(read_u32(buf.as_slice(), &mut offset).unwrap(), v);
            assert_eq!(offset, 4);
        }
    }

    #[test]
    fn string_round_trip() {
        for s in ["", "hello", "utf8 \u{1F600}", "a".repeat(10_000).as_str()] {
            let mut buf = ByteBuffer::new();
            buf.write_string(s);
            let mut offset = 0;
            assert_eq!(read_string(buf.as_slice(), &mut offset).unwrap(), s);
            assert_eq!(offset, buf.len());
        }
    }

    #[test]
    fn is_big_endian_on_the_wire() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(0x0102_0304);
        assert_eq!(buf.as_slice(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn read_u32_on_short_buffer_is_out_of_range() {
        let buf = [0u8, 1, 2];
        let mut offset = 0;
        let err = read_u32(&buf, &mut offset).unwrap_err();
        assert_eq!(err.code(), crate::error::StatusCode::OutOfRange);
    }

    #[test]
    fn read_string_with_declared_length_past_end_is_out_of_range() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(1000);
        buf.write_bytes(b"short");
        let mut offset = 0;
        let err = read_string(buf.as_slice(), &mut offset).unwrap_err();
        assert_eq!(err.code(), crate::error::StatusCode::OutOfRange);
    }

    #[test]
    fn sequential_reads_advance_offset_independently() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(7);
        buf.write_string("ok");
        let mut offset = 0;
        assert_eq!(read_u32(buf.as_slice(), &mut offset).unwrap(), 7);
        assert_eq!(read_string(buf.as_slice(), &mut offset).unwrap(), "ok");
        assert_eq!(offset, buf.len());
    }
}
