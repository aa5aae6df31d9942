//! Cryptographic primitives for the wallet file.
//!
//! - Argon2id key derivation from the PIN
//! - AES-256-GCM sealing of the wallet record

pub mod cipher;
pub mod kdf;

pub use cipher::{open, seal, SealedBlob, WalletKey};
pub use kdf::{derive_wallet_key, KdfParams};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Authentication failed - wrong PIN or tampered data")]
    AuthenticationFailed,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
