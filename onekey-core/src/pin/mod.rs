//! Fixed-length numeric PIN and the segmented input that collects it.

pub mod input;

pub use input::{PinInput, SHAKE_DURATION};

use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of digits in a wallet PIN
pub const PIN_LENGTH: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be {expected} digits")]
    WrongLength { expected: usize, got: usize },

    #[error("PIN must contain only digits")]
    NonDigit,
}

/// A complete PIN
///
/// Only constructible from exactly `length` ASCII digits. The digits are
/// wiped on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Pin(String);

impl Pin {
    /// Parse a PIN of [`PIN_LENGTH`] digits
    pub fn parse(value: &str) -> Result<Self, PinError> {
        Self::parse_with_length(value, PIN_LENGTH)
    }

    pub fn parse_with_length(value: &str, length: usize) -> Result<Self, PinError> {
        if value.chars().count() != length {
            return Err(PinError::WrongLength {
                expected: length,
                got: value.chars().count(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PinError::NonDigit);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time equality
    pub fn matches(&self, other: &Pin) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Pin {}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin(******)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_pin() {
        let pin = Pin::parse("012345").unwrap();
        assert_eq!(pin.as_str(), "012345");
        assert_eq!(pin.len(), PIN_LENGTH);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            Pin::parse("12345"),
            Err(PinError::WrongLength { expected: 6, got: 5 })
        );
        assert!(Pin::parse("1234567").is_err());
        assert!(Pin::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_non_digits() {
        assert_eq!(Pin::parse("12a456"), Err(PinError::NonDigit));
        assert_eq!(Pin::parse("12 456"), Err(PinError::NonDigit));
        // Full-width digits are not ASCII
        assert!(Pin::parse("１２３４５６").is_err());
    }

    #[test]
    fn test_error_message() {
        let err = Pin::parse("123").unwrap_err();
        assert_eq!(err.to_string(), "PIN must be 6 digits");
    }

    #[test]
    fn test_matches() {
        let a = Pin::parse("111111").unwrap();
        let b = Pin::parse("111111").unwrap();
        let c = Pin::parse("222222").unwrap();
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert_eq!(a, b);
    }

    #[test]
    fn test_debug_is_masked() {
        let pin = Pin::parse("987654").unwrap();
        assert!(!format!("{:?}", pin).contains("987654"));
    }
}
