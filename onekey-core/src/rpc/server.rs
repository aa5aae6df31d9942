//! Sidecar request handler and stdio loop
//!
//! One response line per complete non-blank request line. Requests are handled
//! in arrival order; a handler is awaited before the next line is looked at.

use super::framing::LineBuffer;
use super::protocol::{
    to_line, EntryRecord, ReadySignal, RpcError, RpcRequest, RpcResponse, SERVER_ERROR,
};
use crate::compressed::CompressedString;
use crate::ledger::{
    AccountCredentials, Address, EntryInput, Ledger, LedgerError, NodeInfo, PasswordEntry,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Methods the sidecar answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    CreateAccount,
    ConnectExistingAccount,
    DeployAccount,
    GetAddress,
    Test,
    DeployPasswordManager,
    CreatePasswordEntry,
    GetPasswordEntryIds,
    GetPasswordEntryById,
    UpdatePasswordEntry,
    DeletePasswordEntry,
    SharePasswordEntry,
    UnsharePasswordEntry,
    GetSharedPasswordEntryIds,
    GetSharedPasswordEntryIdsByOwner,
}

impl Method {
    pub const ALL: [Method; 16] = [
        Method::Initialize,
        Method::CreateAccount,
        Method::ConnectExistingAccount,
        Method::DeployAccount,
        Method::GetAddress,
        Method::Test,
        Method::DeployPasswordManager,
        Method::CreatePasswordEntry,
        Method::GetPasswordEntryIds,
        Method::GetPasswordEntryById,
        Method::UpdatePasswordEntry,
        Method::DeletePasswordEntry,
        Method::SharePasswordEntry,
        Method::UnsharePasswordEntry,
        Method::GetSharedPasswordEntryIds,
        Method::GetSharedPasswordEntryIdsByOwner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::CreateAccount => "createAccount",
            Method::ConnectExistingAccount => "connectExistingAccount",
            Method::DeployAccount => "deployAccount",
            Method::GetAddress => "getAddress",
            Method::Test => "test",
            Method::DeployPasswordManager => "deployPasswordManager",
            Method::CreatePasswordEntry => "createPasswordEntry",
            Method::GetPasswordEntryIds => "getPasswordEntryIds",
            Method::GetPasswordEntryById => "getPasswordEntryById",
            Method::UpdatePasswordEntry => "updatePasswordEntry",
            Method::DeletePasswordEntry => "deletePasswordEntry",
            Method::SharePasswordEntry => "sharePasswordEntry",
            Method::UnsharePasswordEntry => "unsharePasswordEntry",
            Method::GetSharedPasswordEntryIds => "getSharedPasswordEntryIds",
            Method::GetSharedPasswordEntryIdsByOwner => "getSharedPasswordEntryIdsByOwner",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
enum HandlerError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("No account connected")]
    NoAccount,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to encode result: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HandlerError {
    fn into_rpc(self) -> RpcError {
        match self {
            HandlerError::InvalidParams(detail) => RpcError::invalid_params(detail),
            other => {
                let data = Value::String(format!("{:?}", other));
                RpcError::new(SERVER_ERROR, other.to_string(), Some(data))
            }
        }
    }
}

type HandlerResult = Result<Value, HandlerError>;

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, HandlerError> {
    let params = match params {
        None | Some(Value::Null) => json!({}),
        Some(value) => value,
    };
    serde_json::from_value(params)
        .map_err(|e| HandlerError::InvalidParams(format!("Invalid params: {}", e)))
}

fn compress(field: &str, value: &str) -> Result<CompressedString, HandlerError> {
    CompressedString::new(value)
        .map_err(|e| HandlerError::InvalidParams(format!("Invalid {}: {}", field, e)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    node_url: Option<String>,
}

#[derive(Deserialize)]
struct ConnectParams {
    credentials: AccountCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryParams {
    contract_address: Address,
    id: u64,
    label: String,
    password: String,
    randomness: u64,
}

impl EntryParams {
    fn to_input(&self) -> Result<EntryInput, HandlerError> {
        Ok(EntryInput {
            id: self.id,
            label: compress("label", &self.label)?,
            password: compress("password", &self.password)?,
            randomness: self.randomness,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryIdParams {
    contract_address: Address,
    id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    contract_address: Address,
    #[serde(default)]
    offset: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetByIdParams {
    contract_address: Address,
    id: u64,
    #[serde(default)]
    offset: u64,
    owner: Option<Address>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareParams {
    contract_address: Address,
    id: u64,
    recipient: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharedByOwnerParams {
    contract_address: Address,
    owner: Address,
    #[serde(default)]
    offset: u64,
}

fn entry_record(entry: PasswordEntry) -> EntryRecord {
    EntryRecord {
        id: entry.id,
        label: entry.label.decode(),
        password: entry.password.decode(),
        owner: entry.owner,
        randomness: entry.randomness,
        shared_with: entry.shared_with,
    }
}

/// Per-process connection state
#[derive(Debug, Default, Clone)]
pub struct SidecarSession {
    node: Option<NodeInfo>,
    account: Option<Address>,
}

impl SidecarSession {
    pub fn node(&self) -> Option<&NodeInfo> {
        self.node.as_ref()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }
}

pub struct SidecarServer {
    ledger: Arc<dyn Ledger>,
    default_node_url: String,
    session: SidecarSession,
}

impl SidecarServer {
    pub fn new(ledger: Arc<dyn Ledger>, default_node_url: impl Into<String>) -> Self {
        Self {
            ledger,
            default_node_url: default_node_url.into(),
            session: SidecarSession::default(),
        }
    }

    pub fn session(&self) -> &SidecarSession {
        &self.session
    }

    /// Serve requests from `reader` until end of stream
    ///
    /// Writes the ready signal before reading anything.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(to_line(&ReadySignal { ready: true })?.as_bytes())
            .await?;
        writer.flush().await?;
        info!("Sidecar ready");

        let mut buffer = LineBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                break;
            }

            for line in buffer.push(&chunk[..read]) {
                if let Some(response) = self.handle_line(&line).await {
                    writer.write_all(to_line(&response)?.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }

        if let Some(rest) = buffer.finish() {
            if !rest.trim().is_empty() {
                warn!(
                    bytes = rest.len(),
                    "Dropping unterminated line at end of input"
                );
            }
        }

        info!("Input closed, sidecar stopping");
        Ok(())
    }

    /// Handle one input line; `None` for blank lines
    pub async fn handle_line(&mut self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse request line: {}", e);
                return Some(RpcResponse::failure(
                    Value::Null,
                    RpcError::parse_error(e.to_string()),
                ));
            }
        };

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: RpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                return Some(RpcResponse::failure(
                    id,
                    RpcError::invalid_request(e.to_string()),
                ));
            }
        };

        Some(self.handle_request(request).await)
    }

    pub async fn handle_request(&mut self, request: RpcRequest) -> RpcResponse {
        let method = match request.method.parse::<Method>() {
            Ok(method) => method,
            Err(name) => {
                warn!("Unknown method: {}", name);
                return RpcResponse::failure(request.id, RpcError::unknown_method(&name));
            }
        };

        debug!(%method, id = %request.id, "Handling request");
        match self.dispatch(method, request.params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(e) => {
                warn!(%method, "Request failed: {}", e);
                RpcResponse::failure(request.id, e.into_rpc())
            }
        }
    }

    async fn dispatch(&mut self, method: Method, params: Option<Value>) -> HandlerResult {
        match method {
            Method::Initialize => self.initialize(parse_params(params)?).await,
            Method::CreateAccount => self.create_account().await,
            Method::ConnectExistingAccount => self.connect_account(parse_params(params)?).await,
            Method::DeployAccount => self.deploy_account().await,
            Method::GetAddress => Ok(match self.session.account() {
                Some(address) => json!({ "address": address }),
                None => Value::Null,
            }),
            Method::Test => Ok(json!({
                "success": true,
                "message": "1Key sidecar is running",
            })),
            Method::DeployPasswordManager => {
                let deployer = self.require_account()?;
                let deployment = self.ledger.deploy_password_manager(&deployer).await?;
                Ok(serde_json::to_value(deployment)?)
            }
            Method::CreatePasswordEntry => {
                let owner = self.require_account()?;
                let p: EntryParams = parse_params(params)?;
                let receipt = self
                    .ledger
                    .create_entry(&p.contract_address, &owner, &p.to_input()?)
                    .await?;
                Ok(serde_json::to_value(receipt)?)
            }
            Method::UpdatePasswordEntry => {
                let owner = self.require_account()?;
                let p: EntryParams = parse_params(params)?;
                let receipt = self
                    .ledger
                    .update_entry(&p.contract_address, &owner, &p.to_input()?)
                    .await?;
                Ok(serde_json::to_value(receipt)?)
            }
            Method::DeletePasswordEntry => {
                let owner = self.require_account()?;
                let p: EntryIdParams = parse_params(params)?;
                let receipt = self
                    .ledger
                    .delete_entry(&p.contract_address, &owner, p.id)
                    .await?;
                Ok(serde_json::to_value(receipt)?)
            }
            Method::GetPasswordEntryIds => {
                let owner = self.require_account()?;
                let p: ListParams = parse_params(params)?;
                let page = self
                    .ledger
                    .entry_ids(&p.contract_address, &owner, p.offset)
                    .await?;
                Ok(serde_json::to_value(page)?)
            }
            Method::GetPasswordEntryById => self.entry_by_id(parse_params(params)?).await,
            Method::SharePasswordEntry => {
                let owner = self.require_account()?;
                let p: ShareParams = parse_params(params)?;
                let receipt = self
                    .ledger
                    .share_entry(&p.contract_address, &owner, p.id, &p.recipient)
                    .await?;
                Ok(serde_json::to_value(receipt)?)
            }
            Method::UnsharePasswordEntry => {
                let owner = self.require_account()?;
                let p: ShareParams = parse_params(params)?;
                let receipt = self
                    .ledger
                    .unshare_entry(&p.contract_address, &owner, p.id, &p.recipient)
                    .await?;
                Ok(serde_json::to_value(receipt)?)
            }
            Method::GetSharedPasswordEntryIds => {
                let recipient = self.require_account()?;
                let p: ListParams = parse_params(params)?;
                let page = self
                    .ledger
                    .shared_entry_ids(&p.contract_address, &recipient, p.offset)
                    .await?;
                Ok(serde_json::to_value(page)?)
            }
            Method::GetSharedPasswordEntryIdsByOwner => {
                let recipient = self.require_account()?;
                let p: SharedByOwnerParams = parse_params(params)?;
                let page = self
                    .ledger
                    .shared_entry_ids_by_owner(&p.contract_address, &recipient, &p.owner, p.offset)
                    .await?;
                Ok(serde_json::to_value(page)?)
            }
        }
    }

    fn require_node(&self) -> Result<(), HandlerError> {
        match self.session.node {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotInitialized.into()),
        }
    }

    fn require_account(&self) -> Result<Address, HandlerError> {
        self.session
            .account
            .clone()
            .ok_or(HandlerError::NoAccount)
    }

    async fn initialize(&mut self, params: InitializeParams) -> HandlerResult {
        let node_url = params
            .node_url
            .unwrap_or_else(|| self.default_node_url.clone());
        let node_info = self.ledger.connect(&node_url).await?;
        info!(node = %node_info.node_url, "Connected to node");

        let result = json!({ "success": true, "nodeInfo": node_info });
        self.session.node = Some(node_info);
        Ok(result)
    }

    async fn create_account(&mut self) -> HandlerResult {
        self.require_node()?;
        let account = self.ledger.create_account().await?;
        info!(address = %account.address, "Registered new account");

        self.session.account = Some(account.address.clone());
        Ok(json!({
            "address": account.address,
            "secretKey": account.credentials.secret_key,
            "signingKey": account.credentials.signing_key,
            "salt": account.credentials.salt,
        }))
    }

    async fn connect_account(&mut self, params: ConnectParams) -> HandlerResult {
        self.require_node()?;
        let address = self.ledger.register_account(&params.credentials).await?;
        info!(%address, "Connected existing account");

        self.session.account = Some(address.clone());
        Ok(json!({ "address": address }))
    }

    async fn deploy_account(&mut self) -> HandlerResult {
        let address = self.require_account()?;
        let already = json!({ "alreadyDeployed": true, "txHash": null });

        if self.ledger.is_account_deployed(&address).await? {
            info!(%address, "Account already deployed");
            return Ok(already);
        }

        match self.ledger.deploy_account(&address).await {
            Ok(receipt) => {
                info!(%address, tx = %receipt.tx_hash, "Account deployed");
                Ok(json!({ "txHash": receipt.tx_hash, "alreadyDeployed": false }))
            }
            Err(LedgerError::AlreadyDeployed) => {
                info!(%address, "Account already deployed");
                Ok(already)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn entry_by_id(&mut self, params: GetByIdParams) -> HandlerResult {
        let caller = self.require_account()?;
        let owner = params.owner.unwrap_or_else(|| caller.clone());

        let entry = self
            .ledger
            .entry_by_id(&params.contract_address, &owner, params.id, params.offset)
            .await?;

        // Another owner's entry is visible only once shared with the caller
        let entry = entry.filter(|e| e.owner == caller || e.shared_with.contains(&caller));
        match entry {
            Some(entry) => Ok(serde_json::to_value(entry_record(entry))?),
            None => Ok(Value::Null),
        }
    }
}
