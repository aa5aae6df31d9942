//! 1Key Core Library
//!
//! PIN-gated wallet screens, the encrypted wallet file, and the line-delimited
//! JSON protocol spoken between the desktop host and its sidecar process.

pub mod app;
pub mod compressed;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod lockout;
pub mod pin;
pub mod platform;
pub mod rpc;
pub mod screens;
pub mod service;
pub mod wallet;

pub use app::{AccountBackend, App, Screen};
pub use compressed::CompressedString;
pub use config::AppConfig;
pub use crypto::{CryptoError, KdfParams};
pub use ledger::{Ledger, LedgerError, LocalLedger};
pub use lockout::{AttemptTracker, AttemptVerdict, LockoutPolicy};
pub use pin::{Pin, PinError, PinInput, PIN_LENGTH};
pub use rpc::{RpcClientError, SidecarClient, SidecarServer};
pub use screens::{SetupScreen, UnlockScreen};
pub use service::{EmbeddedWalletService, WalletService};
pub use wallet::{WalletData, WalletStore, WalletVault};

use thiserror::Error;

/// Result type for 1Key operations
pub type Result<T> = std::result::Result<T, OneKeyError>;

/// General error type for 1Key operations
#[derive(Error, Debug)]
pub enum OneKeyError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error(transparent)]
    Pin(#[from] pin::PinError),

    #[error("Incorrect PIN")]
    IncorrectPin,

    #[error("No wallet found")]
    WalletNotFound,

    #[error("No account connected")]
    NotConnected,

    #[error(transparent)]
    Rpc(#[from] rpc::RpcClientError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
