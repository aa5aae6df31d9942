//! AES-256-GCM sealing of the wallet record.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key derived from the PIN
//! - 96-bit (12 byte) nonce, random per seal
//! - 128-bit authentication tag

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroize;

/// Nonce length in bytes
pub const NONCE_LENGTH: usize = 12;

/// Authentication tag length in bytes
pub const TAG_LENGTH: usize = 16;

/// Symmetric key protecting the wallet file
pub struct WalletKey {
    key: [u8; 32],
}

impl WalletKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl Drop for WalletKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Nonce, ciphertext and authentication tag of a sealed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
    pub auth_tag: [u8; TAG_LENGTH],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce
pub fn seal(key: &WalletKey, plaintext: &[u8]) -> Result<SealedBlob> {
    if plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed(
            "Cannot encrypt empty data".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_LENGTH] = nonce.into();

    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;

    // AES-GCM appends the tag to the ciphertext
    if ciphertext.len() < TAG_LENGTH {
        return Err(CryptoError::EncryptionFailed(
            "Ciphertext too short - missing auth tag".to_string(),
        ));
    }
    let tag_start = ciphertext.len() - TAG_LENGTH;
    let auth_tag: [u8; TAG_LENGTH] = ciphertext[tag_start..]
        .try_into()
        .map_err(|_| CryptoError::EncryptionFailed("Invalid auth tag length".to_string()))?;
    ciphertext.truncate(tag_start);

    Ok(SealedBlob {
        nonce: nonce_bytes,
        ciphertext,
        auth_tag,
    })
}

/// Decrypt and authenticate a sealed payload
///
/// A wrong key and a tampered blob are indistinguishable and both yield
/// [`CryptoError::AuthenticationFailed`].
pub fn open(key: &WalletKey, sealed: &SealedBlob) -> Result<Vec<u8>> {
    if sealed.ciphertext.is_empty() {
        return Err(CryptoError::DecryptionFailed(
            "Cannot decrypt empty data".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from(sealed.nonce);

    let mut ciphertext_with_tag = sealed.ciphertext.clone();
    ciphertext_with_tag.extend_from_slice(&sealed.auth_tag);

    cipher
        .decrypt(&nonce, ciphertext_with_tag.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> WalletKey {
        WalletKey::from_bytes(rand::random())
    }

    #[test]
    fn test_seal_open() {
        let key = random_key();
        let sealed = seal(&key, b"{\"address\":\"0x01\"}").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"{\"address\":\"0x01\"}");
    }

    #[test]
    fn test_different_nonces() {
        let key = random_key();
        let a = seal(&key, b"same data").unwrap();
        let b = seal(&key, b"same data").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&random_key(), b"secret").unwrap();
        let result = open(&random_key(), &sealed);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = random_key();
        let mut sealed = seal(&key, b"secret").unwrap();
        sealed.ciphertext[0] ^= 0xff;
        assert!(matches!(
            open(&key, &sealed),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        assert!(seal(&random_key(), b"").is_err());
    }
}
