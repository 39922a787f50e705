//! # Binary Primitives
//!
//! Fixed-width integer and byte-array access over a bounded buffer.
//!
//! [`BinaryReader`] walks a borrowed slice with a monotonic cursor and refuses to read past
//! the end ([`ProtocolError::OutOfRange`]); everything it reads comes from the network, so no
//! length is trusted. [`BinaryWriter`] appends to a `BytesMut`.
//!
//! MRIM is little-endian; SOCKS5 uses network byte order. The order is chosen per reader or
//! writer, not per call.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Byte order of multi-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first (MRIM)
    #[default]
    Little,
    /// Big-endian, as mandated for SOCKS5
    Network,
}

/// Cursor-based reader over untrusted bytes.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endianness,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endianness) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    pub fn little(buf: &'a [u8]) -> Self {
        Self::new(buf, Endianness::Little)
    }

    pub fn network(buf: &'a [u8]) -> Self {
        Self::new(buf, Endianness::Network)
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unconsumed tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Borrow the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::OutOfRange {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let raw = self.take::<2>()?;
        Ok(match self.endian {
            Endianness::Little => u16::from_le_bytes(raw),
            Endianness::Network => u16::from_be_bytes(raw),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take::<4>()?;
        Ok(match self.endian {
            Endianness::Little => u32::from_le_bytes(raw),
            Endianness::Network => u32::from_be_bytes(raw),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_u16().map(|v| v as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    /// Two 32-bit halves, low half first in little-endian order.
    pub fn read_u64(&mut self) -> Result<u64> {
        let first = self.read_u32()? as u64;
        let second = self.read_u32()? as u64;
        Ok(match self.endian {
            Endianness::Little => (second << 32) | first,
            Endianness::Network => (first << 32) | second,
        })
    }

    /// A `u32` length followed by that many bytes.
    pub fn read_lps(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.bytes(len)
    }
}

/// Appending writer with a fixed byte order.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
    endian: Endianness,
}

impl BinaryWriter {
    pub fn new(endian: Endianness) -> Self {
        Self {
            buf: BytesMut::new(),
            endian,
        }
    }

    pub fn with_capacity(capacity: usize, endian: Endianness) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            endian,
        }
    }

    pub fn little() -> Self {
        Self::new(Endianness::Little)
    }

    pub fn network() -> Self {
        Self::new(Endianness::Network)
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        match self.endian {
            Endianness::Little => self.buf.put_u16_le(value),
            Endianness::Network => self.buf.put_u16(value),
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        match self.endian {
            Endianness::Little => self.buf.put_u32_le(value),
            Endianness::Network => self.buf.put_u32(value),
        }
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u64(&mut self, value: u64) {
        let high = (value >> 32) as u32;
        let low = (value & 0xFFFF_FFFF) as u32;
        match self.endian {
            Endianness::Little => {
                self.write_u32(low);
                self.write_u32(high);
            }
            Endianness::Network => {
                self.write_u32(high);
                self.write_u32(low);
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte string with a `u32` prefix.
    pub fn write_lps(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| ProtocolError::OversizedPacket(bytes.len()))?;
        self.write_u32(len);
        self.write_bytes(bytes);
        Ok(())
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_byte_order() {
        let mut le = BinaryWriter::little();
        le.write_u16(0x1234);
        assert_eq!(&le.into_bytes()[..], &[0x34, 0x12]);

        let mut be = BinaryWriter::network();
        be.write_u16(0x1234);
        assert_eq!(&be.into_bytes()[..], &[0x12, 0x34]);
    }

    #[test]
    fn test_reader_respects_endianness() {
        let raw = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(BinaryReader::little(&raw).read_u32().ok(), Some(0x0403_0201));
        assert_eq!(BinaryReader::network(&raw).read_u32().ok(), Some(0x0102_0304));
    }

    #[test]
    fn test_read_past_end_is_out_of_range() {
        let raw = [0xAA, 0xBB, 0xCC];
        let mut reader = BinaryReader::little(&raw);
        assert_eq!(reader.read_u16().ok(), Some(0xBBAA));

        match reader.read_u32() {
            Err(ProtocolError::OutOfRange {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
        // A failed read does not move the cursor.
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_u64_splits_into_32_bit_halves() {
        let value = 0x1122_3344_5566_7788u64;

        let mut le = BinaryWriter::little();
        le.write_u64(value);
        let bytes = le.into_bytes();
        assert_eq!(&bytes[..], &value.to_le_bytes());
        assert_eq!(BinaryReader::little(&bytes).read_u64().ok(), Some(value));

        let mut be = BinaryWriter::network();
        be.write_u64(value);
        let bytes = be.into_bytes();
        assert_eq!(&bytes[..], &value.to_be_bytes());
        assert_eq!(BinaryReader::network(&bytes).read_u64().ok(), Some(value));
    }

    #[test]
    fn test_signed_values() {
        let mut w = BinaryWriter::little();
        w.write_i16(-2);
        w.write_i32(-70_000);
        let bytes = w.into_bytes();
        let mut r = BinaryReader::little(&bytes);
        assert_eq!(r.read_i16().ok(), Some(-2));
        assert_eq!(r.read_i32().ok(), Some(-70_000));
        assert!(r.is_empty());
    }

    #[test]
    fn test_lps_rejects_lying_length() {
        // Claims 16 bytes, carries 2.
        let raw = [0x10, 0x00, 0x00, 0x00, b'h', b'i'];
        let mut reader = BinaryReader::little(&raw);
        assert!(matches!(
            reader.read_lps(),
            Err(ProtocolError::OutOfRange { needed: 16, .. })
        ));
    }
}
