//! Unlock and PIN setup screens.
//!
//! Screens own their PIN inputs and the attempt tracker. The work behind a
//! completed PIN is delegated to the host through [`UnlockHandler`] and
//! [`AccountCreator`].

pub mod setup;
pub mod unlock;

pub use setup::{SetupEvent, SetupScreen, SetupStep};
pub use unlock::{UnlockOutcome, UnlockScreen};

use crate::pin::Pin;
use async_trait::async_trait;

/// Verifies a PIN against the stored wallet
#[async_trait]
pub trait UnlockHandler: Send + Sync {
    /// Returns the wallet address on success
    async fn unlock(&self, pin: &Pin) -> crate::Result<String>;
}

/// Creates a new wallet protected by a PIN
#[async_trait]
pub trait AccountCreator: Send + Sync {
    /// Returns the new wallet address
    async fn create_account(&self, pin: &Pin) -> crate::Result<String>;
}
