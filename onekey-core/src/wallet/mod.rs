//! PIN-encrypted wallet file.
//!
//! The record on disk is JSON. The wallet payload is serialized, sealed with
//! AES-256-GCM under an Argon2id key derived from the PIN, and stored with the
//! salt, nonce and tag as base64 strings.

use crate::crypto::{self, derive_wallet_key, CryptoError, KdfParams, SealedBlob, WalletKey};
use crate::crypto::cipher::{NONCE_LENGTH, TAG_LENGTH};
use crate::crypto::kdf::SALT_LENGTH;
use crate::ledger::AccountCredentials;
use crate::pin::Pin;
use crate::{OneKeyError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Current version of the on-disk record
pub const WALLET_FORMAT_VERSION: u32 = 1;

/// Account keys stored beside the secret key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct AccountKeys {
    pub signing_key: String,
    pub salt: String,
}

/// Decrypted wallet contents
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WalletData {
    pub private_key: String,
    pub address: String,
    #[serde(default, alias = "aztec", skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountKeys>,
}

impl WalletData {
    /// Credentials to reconnect the account, if the wallet carries them
    pub fn credentials(&self) -> Option<AccountCredentials> {
        self.account.as_ref().map(|keys| AccountCredentials {
            secret_key: self.private_key.clone(),
            signing_key: keys.signing_key.clone(),
            salt: keys.salt.clone(),
        })
    }

    pub fn from_credentials(address: impl Into<String>, credentials: &AccountCredentials) -> Self {
        Self {
            private_key: credentials.secret_key.clone(),
            address: address.into(),
            account: Some(AccountKeys {
                signing_key: credentials.signing_key.clone(),
                salt: credentials.salt.clone(),
            }),
        }
    }
}

impl fmt::Debug for WalletData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletData")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("has_account_keys", &self.account.is_some())
            .finish()
    }
}

/// Argon2 costs recorded with the ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfCosts {
    pub mem_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// The wallet file as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedWallet {
    pub version: u32,
    pub kdf: KdfCosts,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    pub auth_tag: String,
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| CryptoError::InvalidEncoding(format!("{}: {}", field, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        CryptoError::InvalidEncoding(format!(
            "{}: expected {} bytes, got {}",
            field,
            N,
            bytes.len()
        ))
        .into()
    })
}

impl EncryptedWallet {
    /// Encrypt `wallet` under `pin` with a fresh salt and nonce
    pub fn seal(wallet: &WalletData, pin: &Pin, template: &KdfParams) -> Result<Self> {
        let params = template.with_fresh_salt();
        let key = derive_wallet_key(pin.as_bytes(), &params)?;
        let key = WalletKey::from_bytes(*key);

        let plaintext = Zeroizing::new(serde_json::to_vec(wallet)?);
        let sealed = crypto::seal(&key, &plaintext)?;

        Ok(Self {
            version: WALLET_FORMAT_VERSION,
            kdf: KdfCosts {
                mem_cost: params.mem_cost,
                time_cost: params.time_cost,
                parallelism: params.parallelism,
            },
            salt: STANDARD.encode(params.salt),
            nonce: STANDARD.encode(sealed.nonce),
            ciphertext: STANDARD.encode(&sealed.ciphertext),
            auth_tag: STANDARD.encode(sealed.auth_tag),
        })
    }

    /// Decrypt with `pin`; a wrong PIN is [`OneKeyError::IncorrectPin`]
    pub fn open(&self, pin: &Pin) -> Result<WalletData> {
        if self.version != WALLET_FORMAT_VERSION {
            return Err(OneKeyError::InvalidInput(format!(
                "Unsupported wallet version {}",
                self.version
            )));
        }

        let params = KdfParams {
            salt: decode_fixed::<SALT_LENGTH>("salt", &self.salt)?,
            mem_cost: self.kdf.mem_cost,
            time_cost: self.kdf.time_cost,
            parallelism: self.kdf.parallelism,
            output_length: 32,
        };
        let sealed = SealedBlob {
            nonce: decode_fixed::<NONCE_LENGTH>("nonce", &self.nonce)?,
            ciphertext: STANDARD
                .decode(&self.ciphertext)
                .map_err(|e| CryptoError::InvalidEncoding(format!("ciphertext: {}", e)))?,
            auth_tag: decode_fixed::<TAG_LENGTH>("auth_tag", &self.auth_tag)?,
        };

        let key = derive_wallet_key(pin.as_bytes(), &params)?;
        let key = WalletKey::from_bytes(*key);

        let plaintext = match crypto::open(&key, &sealed) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(CryptoError::AuthenticationFailed) => return Err(OneKeyError::IncorrectPin),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Storage of the single PIN-protected wallet
pub trait WalletVault: Send + Sync {
    fn exists(&self) -> bool;

    /// Encrypt and write, replacing any existing wallet
    fn store(&self, wallet: &WalletData, pin: &Pin) -> Result<()>;

    fn unlock(&self, pin: &Pin) -> Result<WalletData>;

    /// Remove the wallet; succeeds when none exists
    fn delete(&self) -> Result<()>;
}

/// Wallet file at a fixed path
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
    kdf: KdfParams,
}

impl WalletStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_kdf(path, KdfParams::default())
    }

    /// Use `kdf` costs for new writes
    pub fn with_kdf<P: Into<PathBuf>>(path: P, kdf: KdfParams) -> Self {
        Self {
            path: path.into(),
            kdf,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Option<EncryptedWallet>> {
        if !self.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Write `record` via a temporary file and rename
    pub fn store_record(&self, record: &EncryptedWallet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn encrypt_and_store(&self, wallet: &WalletData, pin: &Pin) -> Result<()> {
        let record = EncryptedWallet::seal(wallet, pin, &self.kdf)?;
        self.store_record(&record)?;
        info!("Stored encrypted wallet at {}", self.path.display());
        Ok(())
    }

    pub fn decrypt_with_pin(&self, pin: &Pin) -> Result<WalletData> {
        let record = self.load()?.ok_or(OneKeyError::WalletNotFound)?;
        let wallet = record.open(pin)?;
        debug!("Decrypted wallet for {}", wallet.address);
        Ok(wallet)
    }

    pub fn delete(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)?;
            info!("Deleted wallet at {}", self.path.display());
        }
        Ok(())
    }
}

impl WalletVault for WalletStore {
    fn exists(&self) -> bool {
        WalletStore::exists(self)
    }

    fn store(&self, wallet: &WalletData, pin: &Pin) -> Result<()> {
        self.encrypt_and_store(wallet, pin)
    }

    fn unlock(&self, pin: &Pin) -> Result<WalletData> {
        self.decrypt_with_pin(pin)
    }

    fn delete(&self) -> Result<()> {
        WalletStore::delete(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_kdf() -> KdfParams {
        KdfParams {
            mem_cost: 64,
            time_cost: 1,
            parallelism: 1,
            ..KdfParams::default()
        }
    }

    fn store() -> (TempDir, WalletStore) {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::with_kdf(dir.path().join("wallet.encrypted"), fast_kdf());
        (dir, store)
    }

    fn wallet() -> WalletData {
        WalletData {
            private_key: "0x0123".to_string(),
            address: "0xabcd".to_string(),
            account: Some(AccountKeys {
                signing_key: "beef".to_string(),
                salt: "0x1337".to_string(),
            }),
        }
    }

    fn pin(value: &str) -> Pin {
        Pin::parse(value).unwrap()
    }

    #[test]
    fn test_store_and_unlock() {
        let (_dir, store) = store();
        assert!(!store.exists());

        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();
        assert!(store.exists());

        let unlocked = store.decrypt_with_pin(&pin("123456")).unwrap();
        assert_eq!(unlocked, wallet());
        assert_eq!(unlocked.credentials().unwrap().signing_key, "beef");
    }

    #[test]
    fn test_wrong_pin() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();
        assert!(matches!(
            store.decrypt_with_pin(&pin("654321")),
            Err(OneKeyError::IncorrectPin)
        ));
    }

    #[test]
    fn test_missing_wallet() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_none());
        assert!(matches!(
            store.decrypt_with_pin(&pin("123456")),
            Err(OneKeyError::WalletNotFound)
        ));
    }

    #[test]
    fn test_fresh_salt_per_write() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();
        let first = store.load().unwrap().unwrap();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();
        let second = store.load().unwrap().unwrap();
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn test_overwrite_changes_pin() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("111111")).unwrap();
        store.encrypt_and_store(&wallet(), &pin("222222")).unwrap();
        assert!(store.decrypt_with_pin(&pin("111111")).is_err());
        assert!(store.decrypt_with_pin(&pin("222222")).is_ok());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();

        let mut record = store.load().unwrap().unwrap();
        let mut bytes = STANDARD.decode(&record.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        record.ciphertext = STANDARD.encode(bytes);
        store.store_record(&record).unwrap();

        assert!(matches!(
            store.decrypt_with_pin(&pin("123456")),
            Err(OneKeyError::IncorrectPin)
        ));
    }

    #[test]
    fn test_bad_encoding() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();

        let mut record = store.load().unwrap().unwrap();
        record.nonce = STANDARD.encode([0u8; 4]);
        store.store_record(&record).unwrap();

        assert!(matches!(
            store.decrypt_with_pin(&pin("123456")),
            Err(OneKeyError::Crypto(CryptoError::InvalidEncoding(_)))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        store.encrypt_and_store(&wallet(), &pin("123456")).unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }

    #[test]
    fn test_legacy_account_key_name() {
        let json = r#"{"private_key":"0x01","address":"0x02","aztec":{"signingKey":"aa","salt":"0x03"}}"#;
        let wallet: WalletData = serde_json::from_str(json).unwrap();
        assert_eq!(wallet.account.as_ref().unwrap().signing_key, "aa");

        let plain: WalletData =
            serde_json::from_str(r#"{"private_key":"0x01","address":"0x02"}"#).unwrap();
        assert!(plain.credentials().is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(!format!("{:?}", wallet()).contains("0x0123"));
    }
}
