//! Tokio codec framing MRIM packets over a byte stream.
//!
//! The read buffer doubles as the per-connection framing buffer: a packet split across
//! several socket reads is held until header and payload are complete, and several packets
//! arriving in one read are yielded one by one.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::packet::{Header, Packet, HEADER_LEN};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy)]
pub struct MrimCodec {
    max_payload: usize,
}

impl MrimCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for MrimCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for MrimCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let header = Header::decode(&src[..HEADER_LEN])?;
        let payload_len = header.payload_length as usize;
        if payload_len > self.max_payload {
            return Err(ProtocolError::OversizedPacket(payload_len));
        }

        let frame_len = HEADER_LEN + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        let payload = frame.split_off(HEADER_LEN).freeze();
        Ok(Some(Packet { header, payload }))
    }
}

impl Encoder<Packet> for MrimCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }
        item.write_to(dst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::packet::ProtocolVersion;
    use bytes::Bytes;

    fn packet(command: u32, payload: &'static [u8]) -> Packet {
        Packet::new(command, 1, ProtocolVersion::SERVER, Bytes::from_static(payload))
    }

    #[test]
    fn test_partial_header_waits() {
        let mut codec = MrimCodec::default();
        let bytes = packet(0x1006, b"").to_bytes().unwrap();
        let mut buf = BytesMut::from(&bytes[..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn test_payload_split_across_reads() {
        let mut codec = MrimCodec::default();
        let bytes = packet(0x1008, b"hello world").to_bytes().unwrap();

        let mut buf = BytesMut::from(&bytes[..HEADER_LEN + 4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[HEADER_LEN + 4..]);
        let decoded = codec.decode(&mut buf).unwrap().expect("complete packet");
        assert_eq!(&decoded.payload[..], b"hello world");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_packets_in_one_read() {
        let mut codec = MrimCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(packet(0x1001, b""), &mut buf).unwrap();
        codec.encode(packet(0x1006, b"xy"), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.command(), 0x1001);
        assert_eq!(second.command(), 0x1006);
        assert_eq!(&second.payload[..], b"xy");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_declared_length_rejected() {
        let mut codec = MrimCodec::new(16);
        let mut header = Header::new(0x1008, 1, ProtocolVersion::SERVER);
        header.payload_length = 1024;
        let mut buf = BytesMut::from(&header.encode().unwrap()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(1024))
        ));
    }

    #[test]
    fn test_garbage_rejected_on_magic() {
        let mut codec = MrimCodec::default();
        let mut buf = BytesMut::from(&[0x47u8; HEADER_LEN][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::InvalidMagic(_))
        ));
    }
}
