//! Argon2id key derivation for the wallet PIN.
//!
//! The PIN profile follows the Argon2 crate defaults:
//! - Memory cost: 19 MiB (19,456 KiB)
//! - Time cost: 2 iterations
//! - Parallelism: 1 lane
//! - Output length: 32 bytes (256 bits)
//! - Salt length: 16 bytes, fresh for every write of the wallet file

use crate::crypto::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 16;

/// Smallest memory cost Argon2 accepts per lane, in KiB
const MIN_MEM_COST_PER_LANE: u32 = 8;

/// Parameters for Argon2id key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Salt for key derivation (16 bytes)
    pub salt: [u8; SALT_LENGTH],

    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of iterations)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,

    /// Output length in bytes
    pub output_length: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            salt: rand::random(),
            mem_cost: Params::DEFAULT_M_COST,
            time_cost: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
            output_length: 32,
        }
    }
}

impl KdfParams {
    /// Create new KDF parameters with a random salt
    pub fn new() -> Self {
        Self::default()
    }

    /// Same cost settings, new random salt
    pub fn with_fresh_salt(&self) -> Self {
        Self {
            salt: rand::random(),
            ..self.clone()
        }
    }

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        if self.mem_cost < MIN_MEM_COST_PER_LANE * self.parallelism {
            return Err(CryptoError::KdfFailed(format!(
                "Memory cost too low (minimum: {} KiB)",
                MIN_MEM_COST_PER_LANE * self.parallelism
            )));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.output_length != 32 {
            return Err(CryptoError::KdfFailed(
                "Output length must be 32 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Derive the 32-byte wallet key from a PIN
///
/// The returned buffer is wiped when dropped.
pub fn derive_wallet_key(pin: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    params.validate()?;

    let params_obj = Params::new(
        params.mem_cost,
        params.time_cost,
        params.parallelism,
        Some(params.output_length as usize),
    )
    .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params_obj);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(pin, &params.salt, key.as_mut_slice())
        .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost: 64,
            time_cost: 1,
            ..KdfParams::default()
        }
    }

    #[test]
    fn test_kdf_params_default() {
        let params = KdfParams::default();
        assert_eq!(params.mem_cost, 19_456);
        assert_eq!(params.time_cost, 2);
        assert_eq!(params.parallelism, 1);
        assert_eq!(params.output_length, 32);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_kdf_params_validation() {
        let mut params = KdfParams::default();

        params.mem_cost = 4;
        assert!(params.validate().is_err());

        params.mem_cost = 19_456;
        params.time_cost = 0;
        assert!(params.validate().is_err());

        params.time_cost = 2;
        params.parallelism = 0;
        assert!(params.validate().is_err());

        params.parallelism = 1;
        params.output_length = 16;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_derive_wallet_key() {
        let params = fast_params();

        let key1 = derive_wallet_key(b"123456", &params).unwrap();
        let key2 = derive_wallet_key(b"123456", &params).unwrap();
        assert_eq!(*key1, *key2);

        let key3 = derive_wallet_key(b"654321", &params).unwrap();
        assert_ne!(*key1, *key3);

        let key4 = derive_wallet_key(b"123456", &params.with_fresh_salt()).unwrap();
        assert_ne!(*key1, *key4);
    }

    #[test]
    fn test_fresh_salt_keeps_costs() {
        let params = fast_params();
        let other = params.with_fresh_salt();
        assert_eq!(other.mem_cost, params.mem_cost);
        assert_eq!(other.time_cost, params.time_cost);
        assert_ne!(other.salt, params.salt);
    }
}
