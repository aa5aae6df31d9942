//! Wallet service wired to the sidecar
//!
//! Owns the sidecar session from the host side: node initialization, account
//! creation and reconnection from the encrypted wallet, and the password
//! manager contract calls.

use super::WalletService;
use crate::app::AccountBackend;
use crate::ledger::{AccountCredentials, ContractDeployment, EntryPage, TxReceipt};
use crate::pin::Pin;
use crate::rpc::{EntryRecord, RpcTransport};
use crate::screens::{AccountCreator, UnlockHandler};
use crate::wallet::WalletData;
use crate::{OneKeyError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedAccount {
    address: String,
    secret_key: String,
    signing_key: String,
    salt: String,
}

#[derive(Deserialize)]
struct ConnectedAddress {
    address: String,
}

/// Result of `deployAccount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub tx_hash: Option<String>,
    pub already_deployed: bool,
}

#[derive(Default)]
struct SessionState {
    initialized: bool,
    address: Option<String>,
}

pub struct EmbeddedWalletService {
    wallet: Arc<WalletService>,
    rpc: Arc<dyn RpcTransport>,
    node_url: String,
    state: Mutex<SessionState>,
}

impl EmbeddedWalletService {
    pub fn new(
        wallet: Arc<WalletService>,
        rpc: Arc<dyn RpcTransport>,
        node_url: impl Into<String>,
    ) -> Self {
        Self {
            wallet,
            rpc,
            node_url: node_url.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn wallet(&self) -> &Arc<WalletService> {
        &self.wallet
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let value = self.rpc.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Connect the sidecar to the node; later calls are no-ops
    pub async fn initialize(&self) -> Result<Value> {
        if self.state.lock().await.initialized {
            return Ok(json!({ "success": true, "message": "Already initialized" }));
        }

        let result = self
            .rpc
            .call("initialize", Some(json!({ "nodeUrl": self.node_url })))
            .await?;
        self.state.lock().await.initialized = true;
        info!("Sidecar initialized against {}", self.node_url);
        Ok(result)
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if !self.state.lock().await.initialized {
            self.initialize().await?;
        }
        Ok(())
    }

    /// Create an account through the sidecar and store its keys under `pin`
    pub async fn create_account(&self, pin: &Pin) -> Result<String> {
        self.ensure_initialized().await?;

        let created: CreatedAccount = self.call("createAccount", None).await?;
        let credentials = AccountCredentials {
            secret_key: created.secret_key,
            signing_key: created.signing_key,
            salt: created.salt,
        };
        let data = WalletData::from_credentials(created.address, &credentials);
        let address = self.wallet.create_wallet(pin, data).await?;

        self.state.lock().await.address = Some(address.clone());
        Ok(address)
    }

    /// Unlock the wallet with `pin` and reconnect its account
    pub async fn connect_account(&self, pin: &Pin) -> Result<String> {
        let data = self.wallet.unlock_wallet(pin).await?;
        self.connect_wallet(&data).await
    }

    async fn connect_wallet(&self, data: &WalletData) -> Result<String> {
        self.ensure_initialized().await?;

        let credentials = data.credentials().ok_or_else(|| {
            OneKeyError::InvalidInput("No account credentials found in wallet".to_string())
        })?;
        let connected: ConnectedAddress = self
            .call(
                "connectExistingAccount",
                Some(json!({ "credentials": credentials })),
            )
            .await?;

        self.state.lock().await.address = Some(connected.address.clone());
        Ok(connected.address)
    }

    pub async fn address(&self) -> Option<String> {
        self.state.lock().await.address.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.address.is_some()
    }

    async fn require_account(&self) -> Result<()> {
        if self.is_connected().await {
            Ok(())
        } else {
            Err(OneKeyError::NotConnected)
        }
    }

    pub async fn deploy_account(&self) -> Result<DeployOutcome> {
        self.require_account().await?;
        self.call("deployAccount", None).await
    }

    pub async fn deploy_password_manager(&self) -> Result<ContractDeployment> {
        self.require_account().await?;
        self.call("deployPasswordManager", None).await
    }

    pub async fn create_entry(
        &self,
        contract_address: &str,
        label: &str,
        password: &str,
        id: u64,
        randomness: u64,
    ) -> Result<TxReceipt> {
        self.require_account().await?;
        self.call(
            "createPasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "label": label,
                "password": password,
                "id": id,
                "randomness": randomness,
            })),
        )
        .await
    }

    pub async fn get_entry_ids(&self, contract_address: &str, offset: u64) -> Result<EntryPage> {
        self.require_account().await?;
        self.call(
            "getPasswordEntryIds",
            Some(json!({ "contractAddress": contract_address, "offset": offset })),
        )
        .await
    }

    /// `owner` defaults to the connected account; `None` back when the entry
    /// is missing or not visible to it
    pub async fn get_entry_by_id(
        &self,
        contract_address: &str,
        id: u64,
        owner: Option<&str>,
        offset: u64,
    ) -> Result<Option<EntryRecord>> {
        self.require_account().await?;
        let mut params = json!({ "contractAddress": contract_address, "id": id, "offset": offset });
        if let Some(owner) = owner {
            params["owner"] = json!(owner);
        }
        self.call("getPasswordEntryById", Some(params)).await
    }

    pub async fn update_entry(
        &self,
        contract_address: &str,
        label: &str,
        password: &str,
        id: u64,
        randomness: u64,
    ) -> Result<TxReceipt> {
        self.require_account().await?;
        self.call(
            "updatePasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "label": label,
                "password": password,
                "id": id,
                "randomness": randomness,
            })),
        )
        .await
    }

    pub async fn delete_entry(&self, contract_address: &str, id: u64) -> Result<TxReceipt> {
        self.require_account().await?;
        self.call(
            "deletePasswordEntry",
            Some(json!({ "contractAddress": contract_address, "id": id })),
        )
        .await
    }

    pub async fn share_entry(
        &self,
        contract_address: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt> {
        self.require_account().await?;
        self.call(
            "sharePasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "id": id,
                "recipient": recipient,
            })),
        )
        .await
    }

    pub async fn unshare_entry(
        &self,
        contract_address: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt> {
        self.require_account().await?;
        self.call(
            "unsharePasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "id": id,
                "recipient": recipient,
            })),
        )
        .await
    }

    /// Entries shared with the connected account, optionally from one owner
    pub async fn get_shared_entry_ids(
        &self,
        contract_address: &str,
        owner: Option<&str>,
        offset: u64,
    ) -> Result<EntryPage> {
        self.require_account().await?;
        match owner {
            Some(owner) => {
                self.call(
                    "getSharedPasswordEntryIdsByOwner",
                    Some(json!({
                        "contractAddress": contract_address,
                        "owner": owner,
                        "offset": offset,
                    })),
                )
                .await
            }
            None => {
                self.call(
                    "getSharedPasswordEntryIds",
                    Some(json!({ "contractAddress": contract_address, "offset": offset })),
                )
                .await
            }
        }
    }

    /// Lock the wallet and forget the connected account
    pub async fn lock(&self) {
        self.wallet.lock_wallet();
        self.state.lock().await.address = None;
    }
}

#[async_trait]
impl UnlockHandler for EmbeddedWalletService {
    /// A PIN that decrypts the wallet unlocks it even when the sidecar
    /// cannot reconnect the account
    async fn unlock(&self, pin: &Pin) -> Result<String> {
        let data = self.wallet.unlock_wallet(pin).await?;
        if data.credentials().is_some() {
            if let Err(e) = self.connect_wallet(&data).await {
                warn!("Unlocked wallet but failed to connect account: {}", e);
            }
        }
        Ok(data.address.clone())
    }
}

#[async_trait]
impl AccountCreator for EmbeddedWalletService {
    async fn create_account(&self, pin: &Pin) -> Result<String> {
        EmbeddedWalletService::create_account(self, pin).await
    }
}

#[async_trait]
impl AccountBackend for EmbeddedWalletService {
    fn wallet_exists(&self) -> bool {
        self.wallet.wallet_exists()
    }

    async fn lock(&self) {
        EmbeddedWalletService::lock(self).await
    }
}
