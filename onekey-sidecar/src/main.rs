//! 1Key sidecar
//!
//! Reads one JSON request per line on stdin and writes one response per
//! line on stdout. Logs go to stderr so they never interleave with the
//! protocol stream.

use anyhow::{Context, Result};
use clap::Parser;
use onekey_core::ledger::{Ledger, LocalLedger};
use onekey_core::{platform, AppConfig, SidecarServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "onekey-sidecar", version, about = "1Key line-delimited JSON sidecar")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ledger database path override
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    /// Keep all ledger state in memory
    #[arg(long, conflicts_with = "ledger")]
    in_memory: bool,

    /// Node URL used when `initialize` omits one
    #[arg(long)]
    node_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(platform::get_default_config_path);
    let mut config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    if let Some(node_url) = cli.node_url {
        config.node_url = node_url;
    }
    if let Some(ledger) = cli.ledger {
        config.ledger_path = Some(ledger);
    }

    info!("Starting 1Key sidecar v{}", VERSION);

    let ledger: Arc<dyn Ledger> = if cli.in_memory {
        info!("Using in-memory ledger");
        Arc::new(LocalLedger::in_memory()?)
    } else {
        let path = config.ledger_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!("Using ledger at {}", path.display());
        Arc::new(
            LocalLedger::open(&path)
                .with_context(|| format!("Failed to open ledger {}", path.display()))?,
        )
    };

    let mut server = SidecarServer::new(ledger, config.node_url.clone());
    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Sidecar stream failed")?;

    info!("Sidecar stopped");
    Ok(())
}
