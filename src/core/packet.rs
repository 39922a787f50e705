//! MRIM container header and packet.
//!
//! ```text
//! [magic u32][ver_minor u16][ver_major u16][seq u32][command u32]
//! [payload_len u32][from_addr u32][from_port u32][reserved 16] [payload ...]
//! ```
//!
//! All integers little-endian; the header is always 44 bytes.

use bytes::{Bytes, BytesMut};

use crate::core::binary::Endianness;
use crate::core::schema::{Field, Fields, Schema};
use crate::error::{ProtocolError, Result};

/// Container magic, first four bytes of every frame.
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// Encoded header size.
pub const HEADER_LEN: usize = 44;

pub const HEADER_SCHEMA: Schema = Schema::new(
    "mrim_header",
    Endianness::Little,
    &[
        Field::uint32("magic").constant(MAGIC as i64),
        Field::uint16("version_minor"),
        Field::uint16("version_major"),
        Field::uint32("seq"),
        Field::uint32("command"),
        Field::uint32("payload_length"),
        Field::uint32("from_address"),
        Field::uint32("from_port"),
        Field::sub_buffer("reserved", 16),
    ],
);

const _: () = assert!(matches!(HEADER_SCHEMA.fixed_size(), Some(HEADER_LEN)));

const RESERVED: [u8; 16] = [0; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Version the server announces when the client has not told us its own.
    pub const SERVER: ProtocolVersion = ProtocolVersion {
        major: 1,
        minor: 22,
    };
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::SERVER
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: ProtocolVersion,
    pub seq: u32,
    pub command: u32,
    pub payload_length: u32,
    pub from_address: u32,
    pub from_port: u32,
}

impl Header {
    pub fn new(command: u32, seq: u32, version: ProtocolVersion) -> Self {
        Self {
            version,
            seq,
            command,
            payload_length: 0,
            from_address: 0,
            from_port: 0,
        }
    }

    pub fn to_fields(&self) -> Fields {
        Fields::new()
            .with("version_minor", self.version.minor)
            .with("version_major", self.version.major)
            .with("seq", self.seq)
            .with("command", self.command)
            .with("payload_length", self.payload_length)
            .with("from_address", self.from_address)
            .with("from_port", self.from_port)
            .with("reserved", Bytes::from_static(&RESERVED))
    }

    pub fn encode(&self) -> Result<Bytes> {
        HEADER_SCHEMA.encode(&self.to_fields())
    }

    /// Decode the first 44 bytes of `buf`. A wrong magic is reported as
    /// [`ProtocolError::InvalidMagic`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fields = HEADER_SCHEMA.decode(buf).map_err(|e| match e {
            ProtocolError::ConstantMismatch {
                field: "magic",
                found,
                ..
            } => ProtocolError::InvalidMagic(found as u32),
            other => other,
        })?;
        Ok(Self {
            version: ProtocolVersion {
                major: fields.u16("version_major")?,
                minor: fields.u16("version_minor")?,
            },
            seq: fields.u32("seq")?,
            command: fields.u32("command")?,
            payload_length: fields.u32("payload_length")?,
            from_address: fields.u32("from_address")?,
            from_port: fields.u32("from_port")?,
        })
    }
}

/// One header plus exactly `payload_length` bytes of command payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(command: u32, seq: u32, version: ProtocolVersion, payload: Bytes) -> Self {
        let mut header = Header::new(command, seq, version);
        header.payload_length = payload.len() as u32;
        Self { header, payload }
    }

    pub fn command(&self) -> u32 {
        self.header.command
    }

    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Append header and payload to `dst`; the length field always reflects the payload.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        let mut header = self.header;
        header.payload_length = u32::try_from(self.payload.len())
            .map_err(|_| ProtocolError::OversizedPacket(self.payload.len()))?;
        dst.reserve(HEADER_LEN + self.payload.len());
        dst.extend_from_slice(&header.encode()?);
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.write_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse a complete packet. The declared payload length is checked against what is
    /// actually present before slicing.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let header = Header::decode(buf)?;
        let declared = header.payload_length as usize;
        let available = buf.len() - HEADER_LEN;
        if declared > available {
            return Err(ProtocolError::LengthMismatch {
                declared,
                available,
            });
        }
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + declared]),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_header_is_44_bytes_with_magic_first() {
        let header = Header::new(0x1001, 7, ProtocolVersion::SERVER);
        let bytes = header.encode().expect("encode");
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..4], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert!(bytes[28..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new(0x1038, 3, ProtocolVersion { major: 1, minor: 9 });
        header.payload_length = 12;
        header.from_address = 0x0100_007F;
        header.from_port = 2041;
        let decoded = Header::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = Header::new(0x1006, 1, ProtocolVersion::SERVER)
            .encode()
            .unwrap()
            .to_vec();
        bytes[0] = 0x00;
        assert!(matches!(
            Header::decode(&bytes),
            Err(ProtocolError::InvalidMagic(0xDEAD_BE00))
        ));
    }

    #[test]
    fn test_declared_length_exceeding_buffer() {
        let packet = Packet::new(
            0x1008,
            1,
            ProtocolVersion::SERVER,
            Bytes::from_static(b"abcdef"),
        );
        let bytes = packet.to_bytes().unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(matches!(
            Packet::from_bytes(truncated),
            Err(ProtocolError::LengthMismatch {
                declared: 6,
                available: 4
            })
        ));
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_payload_length_follows_payload() {
        let mut packet = Packet::new(0x1012, 1, ProtocolVersion::SERVER, Bytes::new());
        packet.payload = Bytes::from_static(&[1, 2, 3]);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(Header::decode(&bytes).unwrap().payload_length, 3);
    }
}
