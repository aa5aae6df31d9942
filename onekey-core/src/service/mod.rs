//! Services the screens and host commands call into.
//!
//! Both are constructed explicitly and shared through `Arc`.

pub mod embedded;
pub mod wallet;

pub use embedded::{DeployOutcome, EmbeddedWalletService};
pub use wallet::WalletService;
