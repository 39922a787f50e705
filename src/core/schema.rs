//! # Declarative Message Schemas
//!
//! A [`Schema`] is a static, ordered table of [`Field`] descriptors. The same table drives
//! both directions, so field order on the wire is identical for encode and decode.
//!
//! ```text
//! const LOGIN_ACK: Schema = Schema::new("login_ack", Endianness::Little, &[
//!     Field::uint32("status"),
//!     Field::charset_string("login"),
//! ]);
//! ```
//!
//! ## Field kinds
//! - `Byte`, `Uint16`, `Uint32`, `Int16`, `Int32`: fixed-width integers in the schema's order
//! - `SubBuffer(n)`: exactly `n` raw bytes
//! - `ByteArray`: `u32` length prefix + raw bytes
//! - `CharsetString`: `u32` length prefix + Windows-1251 text
//! - `UnicodeString`: `u32` byte-length prefix + UTF-16LE text
//! - `Custom`: caller-supplied read/write hooks operating on the cursor
//!
//! Integer fields may carry a constant. Encoding always writes the constant, whatever the
//! caller supplied; decoding fails with [`ProtocolError::ConstantMismatch`] when the wire
//! disagrees.
//!
//! `Schema::new` is a `const fn` that rejects malformed tables (constants on non-integer
//! kinds, out-of-range constants, empty sub-buffers, duplicate keys) during compilation.

use bytes::Bytes;

use crate::core::binary::{BinaryReader, BinaryWriter, Endianness};
use crate::core::charset;
use crate::error::{ProtocolError, Result};

/// Reads one custom field from the cursor.
pub type ReadHook = fn(&mut BinaryReader<'_>) -> Result<Value>;

/// Writes one custom field at the writer's current position.
pub type WriteHook = fn(&Value, &mut BinaryWriter) -> Result<()>;

#[derive(Clone, Copy)]
pub enum FieldKind {
    Byte,
    Uint16,
    Uint32,
    Int16,
    Int32,
    SubBuffer(usize),
    ByteArray,
    CharsetString,
    UnicodeString,
    Custom { read: ReadHook, write: WriteHook },
}

impl FieldKind {
    const fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::Byte
                | FieldKind::Uint16
                | FieldKind::Uint32
                | FieldKind::Int16
                | FieldKind::Int32
        )
    }

    const fn accepts(&self, value: i64) -> bool {
        match self {
            FieldKind::Byte => value >= 0 && value <= u8::MAX as i64,
            FieldKind::Uint16 => value >= 0 && value <= u16::MAX as i64,
            FieldKind::Uint32 => value >= 0 && value <= u32::MAX as i64,
            FieldKind::Int16 => value >= i16::MIN as i64 && value <= i16::MAX as i64,
            FieldKind::Int32 => value >= i32::MIN as i64 && value <= i32::MAX as i64,
            _ => false,
        }
    }

    const fn fixed_width(&self) -> Option<usize> {
        match self {
            FieldKind::Byte => Some(1),
            FieldKind::Uint16 | FieldKind::Int16 => Some(2),
            FieldKind::Uint32 | FieldKind::Int32 => Some(4),
            FieldKind::SubBuffer(n) => Some(*n),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::Byte => "u8",
            FieldKind::Uint16 => "u16",
            FieldKind::Uint32 => "u32",
            FieldKind::Int16 => "i16",
            FieldKind::Int32 => "i32",
            FieldKind::SubBuffer(_) => "fixed-size byte buffer",
            FieldKind::ByteArray => "byte array",
            FieldKind::CharsetString | FieldKind::UnicodeString => "text",
            FieldKind::Custom { .. } => "custom",
        }
    }
}

impl std::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::SubBuffer(n) => write!(f, "SubBuffer({n})"),
            FieldKind::Custom { .. } => f.write_str("Custom"),
            other => f.write_str(other.name()),
        }
    }
}

/// One entry of a schema.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub kind: FieldKind,
    pub constant: Option<i64>,
}

impl Field {
    pub const fn new(key: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            kind,
            constant: None,
        }
    }

    pub const fn byte(key: &'static str) -> Self {
        Self::new(key, FieldKind::Byte)
    }

    pub const fn uint16(key: &'static str) -> Self {
        Self::new(key, FieldKind::Uint16)
    }

    pub const fn uint32(key: &'static str) -> Self {
        Self::new(key, FieldKind::Uint32)
    }

    pub const fn int16(key: &'static str) -> Self {
        Self::new(key, FieldKind::Int16)
    }

    pub const fn int32(key: &'static str) -> Self {
        Self::new(key, FieldKind::Int32)
    }

    pub const fn sub_buffer(key: &'static str, size: usize) -> Self {
        Self::new(key, FieldKind::SubBuffer(size))
    }

    pub const fn byte_array(key: &'static str) -> Self {
        Self::new(key, FieldKind::ByteArray)
    }

    pub const fn charset_string(key: &'static str) -> Self {
        Self::new(key, FieldKind::CharsetString)
    }

    pub const fn unicode_string(key: &'static str) -> Self {
        Self::new(key, FieldKind::UnicodeString)
    }

    pub const fn custom(key: &'static str, read: ReadHook, write: WriteHook) -> Self {
        Self::new(key, FieldKind::Custom { read, write })
    }

    /// Pin the field to a constant value.
    pub const fn constant(self, value: i64) -> Self {
        Self {
            key: self.key,
            kind: self.kind,
            constant: Some(value),
        }
    }
}

/// Decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I16(i16),
    I32(i32),
    Bytes(Bytes),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

/// Ordered key/value record produced by decoding and consumed by encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(&'static str, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    fn require(&self, key: &'static str) -> Result<&Value> {
        self.get(key).ok_or(ProtocolError::MissingField(key))
    }

    fn int(&self, key: &'static str, expected: &'static str) -> Result<i64> {
        self.require(key)?
            .as_int()
            .ok_or(ProtocolError::FieldType {
                field: key,
                expected,
            })
    }

    pub fn u8(&self, key: &'static str) -> Result<u8> {
        u8::try_from(self.int(key, "u8")?).map_err(|_| ProtocolError::FieldType {
            field: key,
            expected: "u8",
        })
    }

    pub fn u16(&self, key: &'static str) -> Result<u16> {
        u16::try_from(self.int(key, "u16")?).map_err(|_| ProtocolError::FieldType {
            field: key,
            expected: "u16",
        })
    }

    pub fn u32(&self, key: &'static str) -> Result<u32> {
        u32::try_from(self.int(key, "u32")?).map_err(|_| ProtocolError::FieldType {
            field: key,
            expected: "u32",
        })
    }

    pub fn i32(&self, key: &'static str) -> Result<i32> {
        i32::try_from(self.int(key, "i32")?).map_err(|_| ProtocolError::FieldType {
            field: key,
            expected: "i32",
        })
    }

    pub fn text(&self, key: &'static str) -> Result<&str> {
        match self.require(key)? {
            Value::Text(s) => Ok(s),
            _ => Err(ProtocolError::FieldType {
                field: key,
                expected: "text",
            }),
        }
    }

    pub fn bytes(&self, key: &'static str) -> Result<&Bytes> {
        match self.require(key)? {
            Value::Bytes(b) => Ok(b),
            _ => Err(ProtocolError::FieldType {
                field: key,
                expected: "bytes",
            }),
        }
    }
}

/// Immutable wire layout.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    name: &'static str,
    endian: Endianness,
    fields: &'static [Field],
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

impl Schema {
    /// Build a schema, validating the table at compile time when used in a `const`.
    pub const fn new(name: &'static str, endian: Endianness, fields: &'static [Field]) -> Self {
        let mut i = 0;
        while i < fields.len() {
            let field = &fields[i];
            if let Some(value) = field.constant {
                if !field.kind.is_integer() {
                    panic!("schema constant on a non-integer field");
                }
                if !field.kind.accepts(value) {
                    panic!("schema constant out of range for its field kind");
                }
            }
            if let FieldKind::SubBuffer(0) = field.kind {
                panic!("schema sub-buffer must be at least one byte");
            }
            let mut j = i + 1;
            while j < fields.len() {
                if str_eq(field.key, fields[j].key) {
                    panic!("schema declares the same key twice");
                }
                j += 1;
            }
            i += 1;
        }
        Self {
            name,
            endian,
            fields,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Total wire size when every field has a fixed width.
    pub const fn fixed_size(&self) -> Option<usize> {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            match self.fields[i].kind.fixed_width() {
                Some(width) => total += width,
                None => return None,
            }
            i += 1;
        }
        Some(total)
    }

    pub fn encode(&self, fields: &Fields) -> Result<Bytes> {
        let mut writer = BinaryWriter::with_capacity(self.fixed_size().unwrap_or(64), self.endian);
        self.encode_into(fields, &mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Append the encoded record to an existing writer (for composite messages).
    pub fn encode_into(&self, fields: &Fields, writer: &mut BinaryWriter) -> Result<()> {
        for field in self.fields {
            if let Some(constant) = field.constant {
                write_int(field, constant, writer)?;
                continue;
            }
            let value = fields.require(field.key)?;
            match field.kind {
                FieldKind::Byte
                | FieldKind::Uint16
                | FieldKind::Uint32
                | FieldKind::Int16
                | FieldKind::Int32 => {
                    let raw = value.as_int().ok_or(ProtocolError::FieldType {
                        field: field.key,
                        expected: field.kind.name(),
                    })?;
                    write_int(field, raw, writer)?;
                }
                FieldKind::SubBuffer(size) => match value {
                    Value::Bytes(b) if b.len() == size => writer.write_bytes(b),
                    _ => {
                        return Err(ProtocolError::FieldType {
                            field: field.key,
                            expected: field.kind.name(),
                        })
                    }
                },
                FieldKind::ByteArray => match value {
                    Value::Bytes(b) => writer.write_lps(b)?,
                    _ => {
                        return Err(ProtocolError::FieldType {
                            field: field.key,
                            expected: field.kind.name(),
                        })
                    }
                },
                FieldKind::CharsetString => {
                    writer.write_lps(&charset::encode_legacy(text_of(field, value)?))?
                }
                FieldKind::UnicodeString => {
                    writer.write_lps(&charset::encode_utf16le(text_of(field, value)?))?
                }
                FieldKind::Custom { write, .. } => write(value, writer)?,
            }
        }
        Ok(())
    }

    pub fn decode(&self, buf: &[u8]) -> Result<Fields> {
        let mut reader = BinaryReader::new(buf, self.endian);
        self.decode_from(&mut reader)
    }

    /// Decode from a shared cursor, leaving it after the last field.
    pub fn decode_from(&self, reader: &mut BinaryReader<'_>) -> Result<Fields> {
        let mut out = Fields {
            entries: Vec::with_capacity(self.fields.len()),
        };
        for field in self.fields {
            let value = match field.kind {
                FieldKind::Byte => Value::U8(reader.read_u8()?),
                FieldKind::Uint16 => Value::U16(reader.read_u16()?),
                FieldKind::Uint32 => Value::U32(reader.read_u32()?),
                FieldKind::Int16 => Value::I16(reader.read_i16()?),
                FieldKind::Int32 => Value::I32(reader.read_i32()?),
                FieldKind::SubBuffer(size) => {
                    Value::Bytes(Bytes::copy_from_slice(reader.bytes(size)?))
                }
                FieldKind::ByteArray => Value::Bytes(Bytes::copy_from_slice(reader.read_lps()?)),
                FieldKind::CharsetString => Value::Text(charset::decode_legacy(reader.read_lps()?)),
                FieldKind::UnicodeString => Value::Text(charset::decode_utf16le(reader.read_lps()?)?),
                FieldKind::Custom { read, .. } => read(reader)?,
            };
            if let Some(expected) = field.constant {
                let found = value.as_int().unwrap_or(i64::MIN);
                if found != expected {
                    return Err(ProtocolError::ConstantMismatch {
                        field: field.key,
                        expected,
                        found,
                    });
                }
            }
            out.entries.push((field.key, value));
        }
        Ok(out)
    }
}

fn text_of<'v>(field: &Field, value: &'v Value) -> Result<&'v str> {
    match value {
        Value::Text(s) => Ok(s),
        _ => Err(ProtocolError::FieldType {
            field: field.key,
            expected: field.kind.name(),
        }),
    }
}

fn write_int(field: &Field, raw: i64, writer: &mut BinaryWriter) -> Result<()> {
    if !field.kind.accepts(raw) {
        return Err(ProtocolError::FieldType {
            field: field.key,
            expected: field.kind.name(),
        });
    }
    match field.kind {
        FieldKind::Byte => writer.write_u8(raw as u8),
        FieldKind::Uint16 => writer.write_u16(raw as u16),
        FieldKind::Uint32 => writer.write_u32(raw as u32),
        FieldKind::Int16 => writer.write_i16(raw as i16),
        FieldKind::Int32 => writer.write_i32(raw as i32),
        _ => {
            return Err(ProtocolError::FieldType {
                field: field.key,
                expected: "integer",
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const SAMPLE: Schema = Schema::new(
        "sample",
        Endianness::Little,
        &[
            Field::uint32("magic").constant(0xCAFE),
            Field::byte("flag"),
            Field::uint16("port"),
            Field::int16("delta"),
            Field::int32("offset"),
            Field::sub_buffer("tag", 3),
            Field::byte_array("blob"),
            Field::charset_string("nick"),
            Field::unicode_string("text"),
        ],
    );

    fn sample_fields() -> Fields {
        Fields::new()
            .with("flag", 7u8)
            .with("port", 2041u16)
            .with("delta", -3i16)
            .with("offset", -100_000i32)
            .with("tag", vec![1u8, 2, 3])
            .with("blob", vec![0xDEu8, 0xAD])
            .with("nick", "Вася")
            .with("text", "привет, мир")
    }

    #[test]
    fn test_roundtrip_non_constant_fields() {
        let bytes = SAMPLE.encode(&sample_fields()).expect("encode");
        let decoded = SAMPLE.decode(&bytes).expect("decode");

        for (key, value) in sample_fields().iter() {
            assert_eq!(decoded.get(key), Some(value), "field {key}");
        }
        assert_eq!(decoded.u32("magic").unwrap(), 0xCAFE);
    }

    #[test]
    fn test_constant_emitted_regardless_of_input() {
        let fields = sample_fields().with("magic", 0x1234u32);
        let bytes = SAMPLE.encode(&fields).expect("encode");
        assert_eq!(&bytes[..4], &0xCAFEu32.to_le_bytes());
    }

    #[test]
    fn test_constant_mismatch_fails() {
        let mut bytes = SAMPLE.encode(&sample_fields()).expect("encode").to_vec();
        bytes[0] ^= 0xFF;
        match SAMPLE.decode(&bytes) {
            Err(ProtocolError::ConstantMismatch {
                field, expected, ..
            }) => {
                assert_eq!(field, "magic");
                assert_eq!(expected, 0xCAFE);
            }
            other => panic!("expected ConstantMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_byte_array_has_four_byte_prefix() {
        const BLOB: Schema = Schema::new("blob", Endianness::Little, &[Field::byte_array("b")]);
        let bytes = BLOB
            .encode(&Fields::new().with("b", vec![9u8, 8, 7]))
            .unwrap();
        assert_eq!(&bytes[..], &[3, 0, 0, 0, 9, 8, 7]);
        assert_eq!(
            BLOB.decode(&bytes).unwrap().bytes("b").unwrap().as_ref(),
            &[9, 8, 7]
        );
    }

    #[test]
    fn test_charset_string_is_transcoded() {
        const NICK: Schema = Schema::new("nick", Endianness::Little, &[Field::charset_string("n")]);
        let bytes = NICK.encode(&Fields::new().with("n", "Ян")).unwrap();
        assert_eq!(&bytes[..], &[2, 0, 0, 0, 0xDF, 0xED]);
    }

    #[test]
    fn test_network_order_schema() {
        const PORT: Schema = Schema::new("port", Endianness::Network, &[Field::uint16("p")]);
        let bytes = PORT.encode(&Fields::new().with("p", 0x0801u16)).unwrap();
        assert_eq!(&bytes[..], &[0x08, 0x01]);
    }

    #[test]
    fn test_missing_field() {
        let fields = sample_fields();
        let mut partial = Fields::new();
        for (k, v) in fields.iter().filter(|(k, _)| *k != "nick") {
            partial.set(k, v.clone());
        }
        assert!(matches!(
            SAMPLE.encode(&partial),
            Err(ProtocolError::MissingField("nick"))
        ));
    }

    #[test]
    fn test_out_of_range_integer_rejected() {
        let fields = sample_fields().with("flag", 300u32);
        assert!(matches!(
            SAMPLE.encode(&fields),
            Err(ProtocolError::FieldType { field: "flag", .. })
        ));
    }

    #[test]
    fn test_truncated_input_is_out_of_range() {
        let bytes = SAMPLE.encode(&sample_fields()).unwrap();
        let err = SAMPLE.decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.is_incomplete());
    }

    fn read_pair(reader: &mut BinaryReader<'_>) -> Result<Value> {
        let a = reader.read_u8()?;
        let b = reader.read_u8()?;
        Ok(Value::U16(((a as u16) << 8) | b as u16))
    }

    fn write_pair(value: &Value, writer: &mut BinaryWriter) -> Result<()> {
        let v = value.as_int().unwrap_or_default() as u16;
        writer.write_u8((v >> 8) as u8);
        writer.write_u8(v as u8);
        Ok(())
    }

    #[test]
    fn test_custom_hooks() {
        const CUSTOM: Schema = Schema::new(
            "custom",
            Endianness::Little,
            &[Field::byte("lead").constant(1), Field::custom("pair", read_pair, write_pair)],
        );
        let bytes = CUSTOM
            .encode(&Fields::new().with("pair", 0xABCDu16))
            .unwrap();
        assert_eq!(&bytes[..], &[1, 0xAB, 0xCD]);
        assert_eq!(CUSTOM.decode(&bytes).unwrap().u16("pair").unwrap(), 0xABCD);
        assert_eq!(CUSTOM.fixed_size(), None);
    }

    #[test]
    fn test_fixed_size() {
        const FIXED: Schema = Schema::new(
            "fixed",
            Endianness::Little,
            &[Field::uint32("a"), Field::uint16("b"), Field::sub_buffer("c", 10)],
        );
        assert_eq!(FIXED.fixed_size(), Some(16));
        assert_eq!(SAMPLE.fixed_size(), None);
    }
}
