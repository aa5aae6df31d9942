//! Platform-specific paths

use std::path::{Path, PathBuf};

/// Directory name under the platform data and config roots
pub const APP_DIR_NAME: &str = "1key";

/// Encrypted wallet file name
pub const WALLET_FILE_NAME: &str = "wallet.encrypted";

/// Local development ledger database
pub const LEDGER_FILE_NAME: &str = "ledger.db";

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Sidecar binary base name
pub const SIDECAR_BINARY: &str = "onekey-sidecar";

/// Overrides the sidecar program location
pub const SIDECAR_PATH_ENV: &str = "ONEKEY_SIDECAR_PATH";

/// Get the platform-specific data directory
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\1key
/// - macOS: ~/Library/Application Support/1key
/// - Linux/Other: ~/.local/share/1key
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR_NAME)
}

/// Get the platform-specific config directory
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR_NAME)
}

pub fn get_default_wallet_path() -> PathBuf {
    get_data_dir().join(WALLET_FILE_NAME)
}

pub fn get_default_ledger_path() -> PathBuf {
    get_data_dir().join(LEDGER_FILE_NAME)
}

pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}

/// Ensure the data directory exists, creating it if necessary
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the binary name for the current platform
///
/// Returns the name with .exe extension on Windows, without on Unix
pub fn get_binary_name(base: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

/// Locate the sidecar program
///
/// Order: `ONEKEY_SIDECAR_PATH`, then `configured`, then a binary next to the
/// running executable, then the bare name for a `PATH` lookup.
pub fn resolve_sidecar_program(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = std::env::var_os(SIDECAR_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    let name = get_binary_name(SIDECAR_BINARY);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}
