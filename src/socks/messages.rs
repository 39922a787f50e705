//! SOCKS5 negotiation messages (RFC 1928 subset), network byte order.
//!
//! ```text
//! handshake:  [ver 5][nmethods][methods ...]
//! selection:  [ver 5][method]
//! request:    [ver 5][cmd][rsv 0][atyp][addr ...][port u16]
//! reply:      [ver 5][rep][rsv 0][atyp][addr ...][port u16]
//! ```

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;

use crate::core::binary::{BinaryReader, BinaryWriter, Endianness};
use crate::core::schema::{Field, Fields, Schema, Value};
use crate::error::{constants, ProtocolError, Result};

pub const SOCKS_VERSION: u8 = 5;

pub mod method {
    pub const NO_AUTHENTICATION: u8 = 0x00;
    pub const GSSAPI: u8 = 0x01;
    pub const USERNAME_PASSWORD: u8 = 0x02;
    pub const NO_ACCEPTABLE: u8 = 0xFF;
}

pub mod command {
    pub const CONNECT: u8 = 0x01;
    pub const BIND: u8 = 0x02;
    pub const UDP_ASSOCIATE: u8 = 0x03;
}

pub mod address_type {
    pub const IPV4: u8 = 0x01;
    pub const DOMAIN: u8 = 0x03;
    pub const IPV6: u8 = 0x04;
}

pub mod reply {
    pub const SUCCEEDED: u8 = 0x00;
    pub const GENERAL_FAILURE: u8 = 0x01;
    pub const CONNECTION_NOT_ALLOWED: u8 = 0x02;
    pub const NETWORK_UNREACHABLE: u8 = 0x03;
    pub const HOST_UNREACHABLE: u8 = 0x04;
    pub const CONNECTION_REFUSED: u8 = 0x05;
    pub const TTL_EXPIRED: u8 = 0x06;
    pub const COMMAND_NOT_SUPPORTED: u8 = 0x07;
    pub const ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
}

const NET: Endianness = Endianness::Network;

pub const HANDSHAKE_SCHEMA: Schema = Schema::new(
    "socks_handshake",
    NET,
    &[
        Field::byte("version").constant(SOCKS_VERSION as i64),
        Field::custom("methods", read_methods, write_methods),
    ],
);

pub const SELECTION_SCHEMA: Schema = Schema::new(
    "socks_method_selection",
    NET,
    &[
        Field::byte("version").constant(SOCKS_VERSION as i64),
        Field::byte("method"),
    ],
);

pub const REQUEST_SCHEMA: Schema = Schema::new(
    "socks_request",
    NET,
    &[
        Field::byte("version").constant(SOCKS_VERSION as i64),
        Field::byte("command"),
        Field::byte("reserved").constant(0),
        Field::custom("address", read_address, write_address),
        Field::uint16("port"),
    ],
);

pub const REPLY_SCHEMA: Schema = Schema::new(
    "socks_reply",
    NET,
    &[
        Field::byte("version").constant(SOCKS_VERSION as i64),
        Field::byte("reply"),
        Field::byte("reserved").constant(0),
        Field::custom("address", read_address, write_address),
        Field::uint16("port"),
    ],
);

fn read_methods(reader: &mut BinaryReader<'_>) -> Result<Value> {
    let count = reader.read_u8()? as usize;
    Ok(Value::Bytes(Bytes::copy_from_slice(reader.bytes(count)?)))
}

fn write_methods(value: &Value, writer: &mut BinaryWriter) -> Result<()> {
    let Value::Bytes(methods) = value else {
        return Err(ProtocolError::FieldType {
            field: "methods",
            expected: "byte list",
        });
    };
    let count = u8::try_from(methods.len())
        .map_err(|_| ProtocolError::Violation(format!("{} methods offered", methods.len())))?;
    writer.write_u8(count);
    writer.write_bytes(methods);
    Ok(())
}

/// Address hooks carry the wire form (`atyp` byte plus address) as raw bytes.
fn read_address(reader: &mut BinaryReader<'_>) -> Result<Value> {
    let address = Address::read(reader)?;
    let mut writer = BinaryWriter::network();
    address.write(&mut writer)?;
    Ok(Value::Bytes(writer.into_bytes()))
}

fn write_address(value: &Value, writer: &mut BinaryWriter) -> Result<()> {
    let Value::Bytes(wire) = value else {
        return Err(ProtocolError::FieldType {
            field: "address",
            expected: "address",
        });
    };
    writer.write_bytes(wire);
    Ok(())
}

/// Destination or bound address of a request or reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    V4(Ipv4Addr),
    Domain(String),
    V6(Ipv6Addr),
}

impl Address {
    /// `0.0.0.0`, used as the bound address of every reply.
    pub const UNSPECIFIED: Address = Address::V4(Ipv4Addr::UNSPECIFIED);

    pub fn address_type(&self) -> u8 {
        match self {
            Address::V4(_) => address_type::IPV4,
            Address::Domain(_) => address_type::DOMAIN,
            Address::V6(_) => address_type::IPV6,
        }
    }

    /// Read `atyp` and the address it announces. An unknown type fails with
    /// [`ProtocolError::UnsupportedOperation`].
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self> {
        match reader.read_u8()? {
            address_type::IPV4 => {
                let octets: [u8; 4] = reader
                    .bytes(4)?
                    .try_into()
                    .map_err(|_| ProtocolError::Internal("ipv4 slice".into()))?;
                Ok(Address::V4(Ipv4Addr::from(octets)))
            }
            address_type::DOMAIN => {
                let len = reader.read_u8()? as usize;
                let name = reader.bytes(len)?;
                let name = std::str::from_utf8(name)
                    .map_err(|_| ProtocolError::Violation("domain name is not valid text".into()))?;
                Ok(Address::Domain(name.to_string()))
            }
            address_type::IPV6 => {
                let octets: [u8; 16] = reader
                    .bytes(16)?
                    .try_into()
                    .map_err(|_| ProtocolError::Internal("ipv6 slice".into()))?;
                Ok(Address::V6(Ipv6Addr::from(octets)))
            }
            _ => Err(ProtocolError::UnsupportedOperation(
                constants::ERR_SOCKS_ADDRESS_TYPE.into(),
            )),
        }
    }

    pub fn write(&self, writer: &mut BinaryWriter) -> Result<()> {
        writer.write_u8(self.address_type());
        match self {
            Address::V4(ip) => writer.write_bytes(&ip.octets()),
            Address::Domain(name) => {
                let len = u8::try_from(name.len())
                    .map_err(|_| ProtocolError::Violation(format!("domain name too long: {name}")))?;
                writer.write_u8(len);
                writer.write_bytes(name.as_bytes());
            }
            Address::V6(ip) => writer.write_bytes(&ip.octets()),
        }
        Ok(())
    }

    fn to_wire(&self) -> Result<Bytes> {
        let mut writer = BinaryWriter::network();
        self.write(&mut writer)?;
        Ok(writer.into_bytes())
    }

    fn from_wire(wire: &[u8]) -> Result<Self> {
        Address::read(&mut BinaryReader::network(wire))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(ip) => write!(f, "{ip}"),
            Address::Domain(name) => f.write_str(name),
            Address::V6(ip) => write!(f, "[{ip}]"),
        }
    }
}

/// Client greeting: the authentication methods it is willing to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub methods: Vec<u8>,
}

impl Handshake {
    pub fn offers(&self, method: u8) -> bool {
        self.methods.contains(&method)
    }

    pub fn encode(&self) -> Result<Bytes> {
        HANDSHAKE_SCHEMA.encode(&Fields::new().with("methods", self.methods.clone()))
    }

    pub fn decode_from(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let fields = HANDSHAKE_SCHEMA.decode_from(reader)?;
        Ok(Self {
            methods: fields.bytes("methods")?.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSelection {
    pub method: u8,
}

impl MethodSelection {
    pub fn encode(&self) -> Result<Bytes> {
        SELECTION_SCHEMA.encode(&Fields::new().with("method", self.method))
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fields = SELECTION_SCHEMA.decode(buf)?;
        Ok(Self {
            method: fields.u8("method")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub command: u8,
    pub address: Address,
    pub port: u16,
}

impl ConnectRequest {
    pub fn encode(&self) -> Result<Bytes> {
        REQUEST_SCHEMA.encode(
            &Fields::new()
                .with("command", self.command)
                .with("address", self.address.to_wire()?)
                .with("port", self.port),
        )
    }

    pub fn decode_from(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let fields = REQUEST_SCHEMA.decode_from(reader)?;
        Ok(Self {
            command: fields.u8("command")?,
            address: Address::from_wire(fields.bytes("address")?)?,
            port: fields.u16("port")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub reply: u8,
    pub address: Address,
    pub port: u16,
}

impl ConnectReply {
    /// A reply with an unspecified bound address.
    pub fn status(reply: u8) -> Self {
        Self {
            reply,
            address: Address::UNSPECIFIED,
            port: 0,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        REPLY_SCHEMA.encode(
            &Fields::new()
                .with("reply", self.reply)
                .with("address", self.address.to_wire()?)
                .with("port", self.port),
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let fields = REPLY_SCHEMA.decode(buf)?;
        Ok(Self {
            reply: fields.u8("reply")?,
            address: Address::from_wire(fields.bytes("address")?)?,
            port: fields.u16("port")?,
        })
    }
}
