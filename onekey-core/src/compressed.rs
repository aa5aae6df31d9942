//! Short strings packed into a single field element.
//!
//! Up to 31 UTF-8 bytes, big-endian, zero padded on the right and rendered
//! as a 32-byte `0x` hex value with a zero top byte so it stays below the
//! field modulus.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest string that fits in one field element
pub const MAX_COMPRESSED_BYTES: usize = 31;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressedStringError {
    #[error("String is {len} bytes, at most 31 fit in a field value")]
    TooLong { len: usize },

    #[error("String contains a NUL byte")]
    NulByte,

    #[error("Invalid field value: {0}")]
    InvalidField(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompressedString {
    bytes: [u8; MAX_COMPRESSED_BYTES],
}

impl CompressedString {
    pub fn new(text: &str) -> Result<Self, CompressedStringError> {
        let raw = text.as_bytes();
        if raw.len() > MAX_COMPRESSED_BYTES {
            return Err(CompressedStringError::TooLong { len: raw.len() });
        }
        // NUL is the padding byte
        if raw.contains(&0) {
            return Err(CompressedStringError::NulByte);
        }

        let mut bytes = [0u8; MAX_COMPRESSED_BYTES];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self { bytes })
    }

    /// Parse the `0x` hex field form
    pub fn from_field_hex(value: &str) -> Result<Self, CompressedStringError> {
        let digits = value.strip_prefix("0x").unwrap_or(value);
        let decoded = hex::decode(digits)
            .map_err(|e| CompressedStringError::InvalidField(e.to_string()))?;
        if decoded.len() != MAX_COMPRESSED_BYTES + 1 || decoded[0] != 0 {
            return Err(CompressedStringError::InvalidField(format!(
                "expected {} bytes with a zero top byte",
                MAX_COMPRESSED_BYTES + 1
            )));
        }

        let mut bytes = [0u8; MAX_COMPRESSED_BYTES];
        bytes.copy_from_slice(&decoded[1..]);

        let compressed = Self { bytes };
        // Padding must be a suffix and the payload valid UTF-8
        let text = compressed.try_decode()?;
        if text.len() != compressed.bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1) {
            return Err(CompressedStringError::NulByte);
        }
        Ok(compressed)
    }

    pub fn to_field_hex(&self) -> String {
        format!("0x00{}", hex::encode(self.bytes))
    }

    /// The original text
    pub fn decode(&self) -> String {
        self.try_decode().unwrap_or_default()
    }

    fn try_decode(&self) -> Result<String, CompressedStringError> {
        let end = self.bytes.iter().position(|b| *b == 0).unwrap_or(self.bytes.len());
        std::str::from_utf8(&self.bytes[..end])
            .map(str::to_string)
            .map_err(|e| CompressedStringError::InvalidField(e.to_string()))
    }
}

impl TryFrom<String> for CompressedString {
    type Error = CompressedStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_field_hex(&value)
    }
}

impl From<CompressedString> for String {
    fn from(value: CompressedString) -> Self {
        value.to_field_hex()
    }
}

impl fmt::Debug for CompressedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompressedString({})", self.to_field_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_decode() {
        let label = CompressedString::new("Bank Account").unwrap();
        assert_eq!(label.decode(), "Bank Account");

        let hex = label.to_field_hex();
        assert_eq!(hex.len(), 2 + 64);
        assert!(hex.starts_with("0x0042616e6b"));
        assert_eq!(CompressedString::from_field_hex(&hex).unwrap(), label);
    }

    #[test]
    fn test_max_length() {
        let text = "a".repeat(31);
        assert_eq!(CompressedString::new(&text).unwrap().decode(), text);

        assert_eq!(
            CompressedString::new(&"a".repeat(32)),
            Err(CompressedStringError::TooLong { len: 32 })
        );
        // Length is counted in bytes
        assert!(CompressedString::new(&"é".repeat(16)).is_err());
    }

    #[test]
    fn test_empty_string() {
        let empty = CompressedString::new("").unwrap();
        assert_eq!(empty.decode(), "");
        assert_eq!(empty.to_field_hex(), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn test_nul_rejected() {
        assert_eq!(
            CompressedString::new("a\0b"),
            Err(CompressedStringError::NulByte)
        );
    }

    #[test]
    fn test_invalid_field_values() {
        assert!(CompressedString::from_field_hex("0x1234").is_err());
        assert!(CompressedString::from_field_hex(&format!("0x01{}", "0".repeat(62))).is_err());
        assert!(CompressedString::from_field_hex("not hex").is_err());
        // Bytes after padding
        let gap = format!("0x0041{}42", "0".repeat(58));
        assert!(CompressedString::from_field_hex(&gap).is_err());
    }

    #[test]
    fn test_serde_uses_field_form() {
        let value = CompressedString::new("secret123").unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, format!("\"{}\"", value.to_field_hex()));
        let back: CompressedString = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decode(), "secret123");
    }
}
