//! The blockchain the sidecar talks to, seen through the calls the
//! password manager needs.

pub mod local;

pub use local::LocalLedger;

use crate::compressed::CompressedString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Entry ids returned per page
pub const PAGE_SIZE: usize = 10;

/// `0x`-prefixed hex address
pub type Address = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Node not initialized")]
    NotInitialized,

    #[error("Account already deployed")]
    AlreadyDeployed,

    #[error("Unknown account: {0}")]
    UnknownAccount(Address),

    #[error("Unknown contract: {0}")]
    UnknownContract(Address),

    #[error("Password entry {0} already exists")]
    DuplicateEntry(u64),

    #[error("Password entry {0} not found")]
    EntryNotFound(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Remote(String),
}

/// Map a node's error text to a [`LedgerError`]
///
/// Nodes report a repeated account deployment only as a message about an
/// existing nullifier. This is the one place that text is inspected.
pub fn classify_remote_error(message: &str) -> LedgerError {
    if message.contains("Existing nullifier") {
        LedgerError::AlreadyDeployed
    } else {
        LedgerError::Remote(message.to_string())
    }
}

/// Keys needed to re-register an account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct AccountCredentials {
    pub secret_key: String,
    pub signing_key: String,
    pub salt: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("secret_key", &"<redacted>")
            .field("signing_key", &"<redacted>")
            .field("salt", &self.salt)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_url: String,
    pub node_version: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub address: Address,
    pub credentials: AccountCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDeployment {
    pub address: Address,
    pub tx_hash: String,
}

/// One page of entry ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub ids: Vec<u64>,
    pub has_more: bool,
}

/// Fields written by create and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInput {
    pub id: u64,
    pub label: CompressedString,
    pub password: CompressedString,
    pub randomness: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordEntry {
    pub id: u64,
    pub owner: Address,
    pub label: CompressedString,
    pub password: CompressedString,
    pub randomness: u64,
    pub shared_with: Vec<Address>,
}

/// Operations of the node, the account contract and the password
/// manager contract
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn connect(&self, node_url: &str) -> Result<NodeInfo, LedgerError>;

    async fn create_account(&self) -> Result<NewAccount, LedgerError>;

    /// Register known credentials; returns the account address
    async fn register_account(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Address, LedgerError>;

    /// Whether the account's initialization nullifier is published
    async fn is_account_deployed(&self, address: &str) -> Result<bool, LedgerError>;

    async fn deploy_account(&self, address: &str) -> Result<TxReceipt, LedgerError>;

    async fn deploy_password_manager(
        &self,
        deployer: &str,
    ) -> Result<ContractDeployment, LedgerError>;

    async fn create_entry(
        &self,
        contract: &str,
        owner: &str,
        entry: &EntryInput,
    ) -> Result<TxReceipt, LedgerError>;

    async fn update_entry(
        &self,
        contract: &str,
        owner: &str,
        entry: &EntryInput,
    ) -> Result<TxReceipt, LedgerError>;

    async fn delete_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
    ) -> Result<TxReceipt, LedgerError>;

    async fn entry_ids(
        &self,
        contract: &str,
        owner: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError>;

    /// Look for `id` in the page starting at `offset`
    async fn entry_by_id(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        offset: u64,
    ) -> Result<Option<PasswordEntry>, LedgerError>;

    async fn share_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt, LedgerError>;

    async fn unshare_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt, LedgerError>;

    async fn shared_entry_ids(
        &self,
        contract: &str,
        recipient: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError>;

    async fn shared_entry_ids_by_owner(
        &self,
        contract: &str,
        recipient: &str,
        owner: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_existing_nullifier() {
        assert_eq!(
            classify_remote_error("Invalid tx: Existing nullifier 0x1234"),
            LedgerError::AlreadyDeployed
        );
        assert_eq!(
            classify_remote_error("Timeout awaiting isMined"),
            LedgerError::Remote("Timeout awaiting isMined".to_string())
        );
    }

    #[test]
    fn test_credentials_wire_names() {
        let credentials = AccountCredentials {
            secret_key: "0x01".to_string(),
            signing_key: "ab".to_string(),
            salt: "0x02".to_string(),
        };
        let value = serde_json::to_value(&credentials).unwrap();
        assert_eq!(value["secretKey"], "0x01");
        assert_eq!(value["signingKey"], "ab");
        assert!(!format!("{:?}", credentials).contains("0x01"));
    }

    #[test]
    fn test_entry_page_wire_names() {
        let page = EntryPage {
            ids: vec![1, 2],
            has_more: true,
        };
        assert_eq!(
            serde_json::to_string(&page).unwrap(),
            r#"{"ids":[1,2],"hasMore":true}"#
        );
    }
}
