//! Text transcoding for MRIM string fields.
//!
//! Legacy fields travel as Windows-1251; unicode fields as UTF-16LE. Inside the server all
//! text is a Rust `String`.

use encoding_rs::{UTF_16LE, WINDOWS_1251};

use crate::error::{ProtocolError, Result};

/// Unicode text to Windows-1251 bytes. Characters without a mapping become numeric
/// character references, which is what MRIM clients display anyway.
pub fn encode_legacy(text: &str) -> Vec<u8> {
    let (bytes, _, _) = WINDOWS_1251.encode(text);
    bytes.into_owned()
}

/// Windows-1251 bytes to Unicode text. Every byte value has a mapping, so this cannot fail.
pub fn decode_legacy(bytes: &[u8]) -> String {
    let (text, _) = WINDOWS_1251.decode_without_bom_handling(bytes);
    text.into_owned()
}

pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

pub fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::Violation(format!(
            "UTF-16 string with odd byte length {}",
            bytes.len()
        )));
    }
    let (text, had_errors) = UTF_16LE.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(ProtocolError::Violation("malformed UTF-16 string".into()));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyrillic_is_single_byte() {
        let bytes = encode_legacy("Привет");
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0xCF);
        assert_eq!(decode_legacy(&bytes), "Привет");
    }

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(encode_legacy("user@mail.ru"), b"user@mail.ru".to_vec());
    }

    #[test]
    fn test_utf16le() {
        let bytes = encode_utf16le("Ёж");
        assert_eq!(bytes, vec![0x01, 0x04, 0x36, 0x04]);
        assert_eq!(decode_utf16le(&bytes).ok().as_deref(), Some("Ёж"));
    }

    #[test]
    fn test_utf16le_odd_length_rejected() {
        assert!(decode_utf16le(&[0x41, 0x00, 0x42]).is_err());
    }

    #[test]
    fn test_utf16le_lone_surrogate_rejected() {
        assert!(decode_utf16le(&[0x00, 0xD8]).is_err());
    }
}
