//! Application configuration
//!
//! ```toml
//! node_url = "http://localhost:8080"
//!
//! [lockout]
//! policy = "timed_lockout"
//! max_attempts = 5
//! duration_secs = 60
//!
//! [sidecar]
//! program = "/usr/local/bin/onekey-sidecar"
//! request_timeout_secs = 900
//! ```

use crate::lockout::LockoutPolicy;
use crate::platform;
use crate::rpc::client::{SidecarProcessConfig, DEFAULT_READY_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::{OneKeyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_NODE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    /// Zero disables the timeout
    pub request_timeout_secs: u64,
    pub ready_timeout_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            ready_timeout_secs: DEFAULT_READY_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node_url: String,
    pub lockout: LockoutPolicy,
    pub wallet_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub sidecar: SidecarConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            lockout: LockoutPolicy::default(),
            wallet_path: None,
            ledger_path: None,
            sidecar: SidecarConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| OneKeyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml(&text)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_url.trim().is_empty() {
            return Err(OneKeyError::Config("node_url must not be empty".to_string()));
        }
        self.lockout
            .validate()
            .map_err(|e| OneKeyError::Config(format!("lockout: {}", e)))?;
        if self.sidecar.ready_timeout_secs == 0 {
            return Err(OneKeyError::Config(
                "sidecar.ready_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wallet_path(&self) -> PathBuf {
        self.wallet_path
            .clone()
            .unwrap_or_else(platform::get_default_wallet_path)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(platform::get_default_ledger_path)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.sidecar.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn sidecar_process(&self) -> SidecarProcessConfig {
        SidecarProcessConfig {
            program: platform::resolve_sidecar_program(self.sidecar.program.as_deref()),
            args: self.sidecar.args.clone(),
            request_timeout: self.request_timeout(),
            ready_timeout: Duration::from_secs(self.sidecar.ready_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.node_url, "http://localhost:8080");
        assert_eq!(config.lockout, LockoutPolicy::default());
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(900)));
        assert!(config.wallet_path().ends_with("wallet.encrypted"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_parse_full() {
        let config = AppConfig::from_toml(
            r#"
node_url = "http://node.example:8080"
wallet_path = "/tmp/w.encrypted"

[lockout]
policy = "return_to_start_after"
max_attempts = 2

[sidecar]
program = "/opt/onekey-sidecar"
args = ["--in-memory"]
request_timeout_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(config.node_url, "http://node.example:8080");
        assert_eq!(config.lockout, LockoutPolicy::return_to_start());
        assert_eq!(config.wallet_path(), PathBuf::from("/tmp/w.encrypted"));
        assert_eq!(config.sidecar.args, vec!["--in-memory"]);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.sidecar.ready_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_lockout_rejected() {
        let result = AppConfig::from_toml(
            "[lockout]\npolicy = \"timed_lockout\"\nmax_attempts = 0\nduration_secs = 60\n",
        );
        assert!(matches!(result, Err(OneKeyError::Config(_))));
    }

    #[test]
    fn test_load_or_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(AppConfig::load_or_default(&path).unwrap(), AppConfig::default());

        std::fs::write(&path, "node_url = \"https://remote:443\"\n").unwrap();
        assert_eq!(
            AppConfig::load_or_default(&path).unwrap().node_url,
            "https://remote:443"
        );
    }
}
