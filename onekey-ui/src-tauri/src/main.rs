// Prevents additional console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use onekey_core::rpc::RpcTransport;
use onekey_core::{platform, AppConfig, Pin, SidecarClient, WalletData, WalletStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tauri::{Manager, State};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Application state
struct AppState {
    config: AppConfig,
    store: Arc<WalletStore>,
    sidecar: Mutex<Option<Arc<SidecarClient>>>,
}

impl AppState {
    fn new(config: AppConfig) -> Self {
        let store = Arc::new(WalletStore::new(config.wallet_path()));
        Self {
            config,
            store,
            sidecar: Mutex::new(None),
        }
    }

    /// The running sidecar, started on first use
    async fn sidecar(&self) -> Result<Arc<SidecarClient>, String> {
        let mut guard = self.sidecar.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let process = self.config.sidecar_process();
        let client = SidecarClient::spawn(&process)
            .await
            .map_err(|e| format!("Failed to start sidecar: {}", e))?;
        let client = Arc::new(client);
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, String> {
        let client = self.sidecar().await?;
        client.call(method, params).await.map_err(|e| e.to_string())
    }

    async fn stop_sidecar(&self) {
        let Some(client) = self.sidecar.lock().await.take() else {
            return;
        };
        match Arc::try_unwrap(client) {
            Ok(client) => {
                if let Err(e) = client.shutdown().await {
                    warn!("Failed to stop sidecar: {}", e);
                }
            }
            Err(_) => warn!("Sidecar still in use at exit"),
        }
    }
}

fn parse_pin(pin: &str) -> Result<Pin, String> {
    Pin::parse(pin).map_err(|e| e.to_string())
}

// Wallet file

#[tauri::command]
fn wallet_exists(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.store.exists())
}

#[tauri::command]
async fn encrypt_and_store_wallet(
    wallet: WalletData,
    pin: String,
    state: State<'_, AppState>,
) -> Result<(), String> {
    let pin = parse_pin(&pin)?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.encrypt_and_store(&wallet, &pin))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
    info!("Wallet stored");
    Ok(())
}

#[tauri::command]
async fn decrypt_wallet_with_pin(
    pin: String,
    state: State<'_, AppState>,
) -> Result<WalletData, String> {
    let pin = parse_pin(&pin)?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.decrypt_with_pin(&pin))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn delete_wallet(state: State<'_, AppState>) -> Result<(), String> {
    state.store.delete().map_err(|e| e.to_string())
}

// Sidecar session

#[tauri::command]
async fn sidecar_initialize(
    node_url: Option<String>,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    let node_url = node_url.unwrap_or_else(|| state.config.node_url.clone());
    state
        .call("initialize", Some(json!({ "nodeUrl": node_url })))
        .await
}

#[tauri::command]
async fn sidecar_create_account(state: State<'_, AppState>) -> Result<Value, String> {
    state.call("createAccount", None).await
}

#[tauri::command]
async fn sidecar_connect_account(
    credentials: Value,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
            "connectExistingAccount",
            Some(json!({ "credentials": credentials })),
        )
        .await
}

#[tauri::command]
async fn sidecar_deploy_account(state: State<'_, AppState>) -> Result<Value, String> {
    state.call("deployAccount", None).await
}

#[tauri::command]
async fn sidecar_test(state: State<'_, AppState>) -> Result<Value, String> {
    state.call("test", None).await
}

// Password manager contract

#[tauri::command]
async fn password_manager_deploy(state: State<'_, AppState>) -> Result<Value, String> {
    state.call("deployPasswordManager", None).await
}

#[tauri::command]
async fn password_manager_create_entry(
    contract_address: String,
    label: String,
    password: String,
    id: u64,
    randomness: u64,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
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

#[tauri::command]
async fn password_manager_get_entry_ids(
    contract_address: String,
    offset: Option<u64>,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
            "getPasswordEntryIds",
            Some(json!({
                "contractAddress": contract_address,
                "offset": offset.unwrap_or(0),
            })),
        )
        .await
}

#[tauri::command]
async fn password_manager_get_entry_by_id(
    contract_address: String,
    id: u64,
    owner: Option<String>,
    offset: Option<u64>,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    let mut params = json!({
        "contractAddress": contract_address,
        "id": id,
        "offset": offset.unwrap_or(0),
    });
    if let Some(owner) = owner {
        params["owner"] = json!(owner);
    }
    state.call("getPasswordEntryById", Some(params)).await
}

#[tauri::command]
async fn password_manager_update_entry(
    contract_address: String,
    label: String,
    password: String,
    id: u64,
    randomness: u64,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
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

#[tauri::command]
async fn password_manager_delete_entry(
    contract_address: String,
    id: u64,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
            "deletePasswordEntry",
            Some(json!({ "contractAddress": contract_address, "id": id })),
        )
        .await
}

#[tauri::command]
async fn password_manager_share_entry(
    contract_address: String,
    id: u64,
    recipient: String,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
            "sharePasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "id": id,
                "recipient": recipient,
            })),
        )
        .await
}

#[tauri::command]
async fn password_manager_unshare_entry(
    contract_address: String,
    id: u64,
    recipient: String,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    state
        .call(
            "unsharePasswordEntry",
            Some(json!({
                "contractAddress": contract_address,
                "id": id,
                "recipient": recipient,
            })),
        )
        .await
}

#[tauri::command]
async fn password_manager_get_shared_entry_ids(
    contract_address: String,
    owner: Option<String>,
    offset: Option<u64>,
    state: State<'_, AppState>,
) -> Result<Value, String> {
    let offset = offset.unwrap_or(0);
    match owner {
        Some(owner) => {
            state
                .call(
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
            state
                .call(
                    "getSharedPasswordEntryIds",
                    Some(json!({ "contractAddress": contract_address, "offset": offset })),
                )
                .await
        }
    }
}

fn load_config() -> AppConfig {
    let path = platform::get_default_config_path();
    match AppConfig::load_or_default(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .init();

    let config = load_config();
    if let Err(e) = platform::ensure_data_dir() {
        warn!("Failed to create data directory: {}", e);
    }

    let app = tauri::Builder::default()
        .manage(AppState::new(config))
        .invoke_handler(tauri::generate_handler![
            wallet_exists,
            encrypt_and_store_wallet,
            decrypt_wallet_with_pin,
            delete_wallet,
            sidecar_initialize,
            sidecar_create_account,
            sidecar_connect_account,
            sidecar_deploy_account,
            sidecar_test,
            password_manager_deploy,
            password_manager_create_entry,
            password_manager_get_entry_ids,
            password_manager_get_entry_by_id,
            password_manager_update_entry,
            password_manager_delete_entry,
            password_manager_share_entry,
            password_manager_unshare_entry,
            password_manager_get_shared_entry_ids,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if matches!(event, tauri::RunEvent::Exit) {
            let state = app_handle.state::<AppState>();
            tauri::async_runtime::block_on(state.stop_sidecar());
        }
    });
}
