//! Wallet lifecycle over a [`WalletVault`]

use crate::pin::Pin;
use crate::wallet::{WalletData, WalletVault};
use crate::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Create, unlock and lock the PIN-protected wallet
///
/// Key derivation runs on the blocking pool. The decrypted wallet is cached
/// until [`WalletService::lock_wallet`].
pub struct WalletService {
    vault: Arc<dyn WalletVault>,
    unlocked: Mutex<Option<WalletData>>,
}

impl WalletService {
    pub fn new(vault: Arc<dyn WalletVault>) -> Self {
        Self {
            vault,
            unlocked: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<WalletData>> {
        self.unlocked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wallet_exists(&self) -> bool {
        self.vault.exists()
    }

    /// Encrypt `wallet` under `pin`, replacing any stored wallet
    ///
    /// The new wallet stays unlocked.
    pub async fn create_wallet(&self, pin: &Pin, wallet: WalletData) -> Result<String> {
        let vault = self.vault.clone();
        let pin = pin.clone();
        let stored = wallet.clone();
        tokio::task::spawn_blocking(move || vault.store(&stored, &pin)).await??;

        let address = wallet.address.clone();
        *self.cache() = Some(wallet);
        info!("Created wallet {}", address);
        Ok(address)
    }

    /// Decrypt the stored wallet with `pin`
    ///
    /// The PIN is checked against the stored record even while a wallet is
    /// cached; a wrong PIN leaves the cache untouched.
    pub async fn unlock_wallet(&self, pin: &Pin) -> Result<WalletData> {
        if self.is_unlocked() {
            debug!("Wallet already unlocked, checking PIN again");
        }

        let vault = self.vault.clone();
        let pin = pin.clone();
        let wallet = tokio::task::spawn_blocking(move || vault.unlock(&pin)).await??;

        *self.cache() = Some(wallet.clone());
        Ok(wallet)
    }

    /// Forget the decrypted wallet
    pub fn lock_wallet(&self) {
        if self.cache().take().is_some() {
            info!("Wallet locked");
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.cache().is_some()
    }

    pub fn address(&self) -> Option<String> {
        self.cache().as_ref().map(|wallet| wallet.address.clone())
    }

    pub async fn delete_wallet(&self) -> Result<()> {
        let vault = self.vault.clone();
        tokio::task::spawn_blocking(move || vault.delete()).await??;
        self.lock_wallet();
        Ok(())
    }
}
