use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use onekey_core::lockout::LockoutTick;
use onekey_core::rpc::RpcTransport;
use onekey_core::screens::{SetupEvent, UnlockOutcome};
use onekey_core::{
    platform, App, AppConfig, EmbeddedWalletService, LockoutPolicy, Screen, SidecarClient,
    WalletService, WalletStore,
};
use rpassword::prompt_password;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 1Key - PIN-protected wallet and on-chain password manager
#[derive(Parser)]
#[command(name = "onekey", version)]
#[command(about = "PIN-protected wallet and password manager", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Encrypted wallet path override
    #[arg(short, long, global = true)]
    wallet: Option<PathBuf>,

    /// Node URL override
    #[arg(long, global = true)]
    node_url: Option<String>,

    /// Sidecar binary override
    #[arg(long, global = true)]
    sidecar: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show wallet and configuration state
    Status,

    /// Create a new wallet protected by a 6-digit PIN
    Create {
        /// Replace an existing wallet
        #[arg(long)]
        force: bool,
    },

    /// Unlock the wallet and connect its account
    Unlock,

    /// Delete the encrypted wallet
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Check that the sidecar answers
    Ping,

    /// Deploy the account if needed, then a password manager contract
    DeployContract,

    /// Password entries in a deployed contract
    #[command(subcommand)]
    Entry(EntryCommand),
}

#[derive(Args)]
struct ContractArg {
    /// Password manager contract address
    #[arg(long)]
    contract: String,
}

#[derive(Subcommand)]
enum EntryCommand {
    /// Create an entry
    Add {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        label: String,
        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        randomness: Option<u64>,
    },

    /// List your entry ids
    List {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Show one entry
    Get {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
        /// Owner of a shared entry
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Replace an entry's label and password
    Update {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        label: String,
        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        randomness: Option<u64>,
    },

    /// Delete an entry
    Remove {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
    },

    /// Share an entry with another account
    Share {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        recipient: String,
    },

    /// Stop sharing an entry
    Unshare {
        #[command(flatten)]
        contract: ContractArg,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        recipient: String,
    },

    /// List entries shared with you
    Shared {
        #[command(flatten)]
        contract: ContractArg,
        /// Only entries from this owner
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Status => status(&config),
        Commands::Create { force } => create(&config, force).await,
        Commands::Unlock => {
            let session = Session::start(&config).await?;
            let address = session.login().await?;
            println!("Unlocked {}", address);
            session.finish().await
        }
        Commands::Delete { yes } => delete(&config, yes).await,
        Commands::Ping => {
            let session = Session::start(&config).await?;
            let result = session.client.call("test", None).await?;
            print_json(&result)?;
            session.finish().await
        }
        Commands::DeployContract => {
            let session = Session::start(&config).await?;
            session.login().await?;

            let account = session.service.deploy_account().await?;
            if account.already_deployed {
                println!("Account already deployed");
            } else if let Some(tx_hash) = &account.tx_hash {
                println!("Account deployed in {}", tx_hash);
            }

            let deployment = session.service.deploy_password_manager().await?;
            print_json(&deployment)?;
            session.finish().await
        }
        Commands::Entry(command) => {
            let session = Session::start(&config).await?;
            session.login().await?;
            entry(&session.service, command).await?;
            session.finish().await
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(platform::get_default_config_path);
    let mut config = AppConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;

    if let Some(wallet) = &cli.wallet {
        config.wallet_path = Some(wallet.clone());
    }
    if let Some(node_url) = &cli.node_url {
        config.node_url = node_url.clone();
    }
    if let Some(sidecar) = &cli.sidecar {
        config.sidecar.program = Some(sidecar.clone());
    }
    debug!("Using configuration {:?}", config);
    Ok(config)
}

fn wallet_service(config: &AppConfig) -> Arc<WalletService> {
    let store = WalletStore::new(config.wallet_path());
    Arc::new(WalletService::new(Arc::new(store)))
}

fn status(config: &AppConfig) -> Result<()> {
    let wallet = wallet_service(config);
    let path = config.wallet_path();
    if wallet.wallet_exists() {
        println!("Wallet: {}", path.display());
    } else {
        println!("Wallet: none (expected at {})", path.display());
    }
    println!("Node: {}", config.node_url);
    println!("Sidecar: {}", config.sidecar_process().program.display());
    match config.lockout {
        LockoutPolicy::TimedLockout {
            max_attempts,
            duration_secs,
        } => println!(
            "Lockout: {} attempts, then {}s wait",
            max_attempts, duration_secs
        ),
        LockoutPolicy::ReturnToStartAfter { max_attempts } => {
            println!("Lockout: {} attempts, then back to start", max_attempts)
        }
    }
    Ok(())
}

async fn create(config: &AppConfig, force: bool) -> Result<()> {
    if wallet_service(config).wallet_exists() && !force {
        bail!(
            "A wallet already exists at {}. Use --force to replace it.",
            config.wallet_path().display()
        );
    }

    let session = Session::start(config).await?;
    let mut app = session.app();
    app.choose_create();

    loop {
        let first = prompt_password("Choose a 6-digit PIN: ")?;
        match app.enter_setup_pin(&first) {
            SetupEvent::ConfirmRequested => {}
            _ => {
                print_setup_error(&app);
                continue;
            }
        }

        loop {
            let second = prompt_password("Confirm PIN: ")?;
            match app.confirm_setup_pin(&second).await {
                SetupEvent::Confirmed(_) => break,
                SetupEvent::Mismatch | SetupEvent::Rejected => print_setup_error(&app),
                _ => bail!("Setup ended unexpectedly"),
            }
        }

        match app.screen() {
            Screen::Home { address } => {
                println!("Wallet created: {}", address);
                break;
            }
            // Creation failed and the setup screen started over
            _ => print_setup_error(&app),
        }
    }

    drop(app);
    session.finish().await
}

fn print_setup_error(app: &App<EmbeddedWalletService>) {
    if let Screen::Setup(setup) = app.screen() {
        if let Some(error) = setup.error() {
            eprintln!("{}", error);
        }
    }
}

async fn delete(config: &AppConfig, yes: bool) -> Result<()> {
    let wallet = wallet_service(config);
    if !wallet.wallet_exists() {
        println!("No wallet to delete");
        return Ok(());
    }

    if !yes {
        print!(
            "Delete wallet at {}? Keys not backed up elsewhere are lost. [y/N] ",
            config.wallet_path().display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Cancelled");
            return Ok(());
        }
    }

    wallet.delete_wallet().await?;
    info!("Wallet deleted");
    println!("Wallet deleted");
    Ok(())
}

async fn entry(service: &EmbeddedWalletService, command: EntryCommand) -> Result<()> {
    match command {
        EntryCommand::Add {
            contract,
            id,
            label,
            password,
            randomness,
        } => {
            let password = read_secret(password)?;
            let receipt = service
                .create_entry(
                    &contract.contract,
                    &label,
                    &password,
                    id,
                    randomness.unwrap_or_else(rand::random),
                )
                .await?;
            print_json(&receipt)
        }
        EntryCommand::List { contract, offset } => {
            let page = service.get_entry_ids(&contract.contract, offset).await?;
            print_json(&page)
        }
        EntryCommand::Get {
            contract,
            id,
            owner,
            offset,
        } => {
            match service
                .get_entry_by_id(&contract.contract, id, owner.as_deref(), offset)
                .await?
            {
                Some(record) => print_json(&record),
                None => bail!("Entry {} not found", id),
            }
        }
        EntryCommand::Update {
            contract,
            id,
            label,
            password,
            randomness,
        } => {
            let password = read_secret(password)?;
            let receipt = service
                .update_entry(
                    &contract.contract,
                    &label,
                    &password,
                    id,
                    randomness.unwrap_or_else(rand::random),
                )
                .await?;
            print_json(&receipt)
        }
        EntryCommand::Remove { contract, id } => {
            let receipt = service.delete_entry(&contract.contract, id).await?;
            print_json(&receipt)
        }
        EntryCommand::Share {
            contract,
            id,
            recipient,
        } => {
            let receipt = service
                .share_entry(&contract.contract, id, &recipient)
                .await?;
            print_json(&receipt)
        }
        EntryCommand::Unshare {
            contract,
            id,
            recipient,
        } => {
            let receipt = service
                .unshare_entry(&contract.contract, id, &recipient)
                .await?;
            print_json(&receipt)
        }
        EntryCommand::Shared {
            contract,
            owner,
            offset,
        } => {
            let page = service
                .get_shared_entry_ids(&contract.contract, owner.as_deref(), offset)
                .await?;
            print_json(&page)
        }
    }
}

fn read_secret(value: Option<String>) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => Ok(prompt_password("Entry password: ")?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A running sidecar with the wallet service on top
struct Session {
    service: Arc<EmbeddedWalletService>,
    client: Arc<SidecarClient>,
    policy: LockoutPolicy,
}

impl Session {
    async fn start(config: &AppConfig) -> Result<Self> {
        let process = config.sidecar_process();
        let client = SidecarClient::spawn(&process)
            .await
            .with_context(|| format!("Failed to start sidecar {}", process.program.display()))?;
        let client = Arc::new(client);

        let transport: Arc<dyn RpcTransport> = client.clone();
        let service = Arc::new(EmbeddedWalletService::new(
            wallet_service(config),
            transport,
            config.node_url.clone(),
        ));
        service.initialize().await?;

        Ok(Self {
            service,
            client,
            policy: config.lockout,
        })
    }

    fn app(&self) -> App<EmbeddedWalletService> {
        App::new(self.service.clone(), self.policy)
    }

    /// Prompt for the PIN until the wallet unlocks
    async fn login(&self) -> Result<String> {
        if !self.service.wallet().wallet_exists() {
            bail!("No wallet found. Create one with: onekey create");
        }

        let mut app = self.app();
        app.start();

        loop {
            let pin = prompt_password("Enter PIN: ")?;
            match app.submit_unlock(&pin).await {
                UnlockOutcome::Unlocked { address } => return Ok(address),
                UnlockOutcome::Invalid | UnlockOutcome::Retry { .. } => {
                    if let Screen::Login(unlock) = app.screen() {
                        if let Some(error) = unlock.error() {
                            eprintln!("{}", error);
                        }
                        if let Some(info) = unlock.attempts_info() {
                            eprintln!("{}", info);
                        }
                    }
                }
                UnlockOutcome::LockedOut { .. } => {
                    if let Screen::Login(unlock) = app.screen_mut() {
                        if let Some(message) = unlock.lockout_message() {
                            eprint!("{}", message);
                        }
                        unlock
                            .run_lockout(|screen, tick| match tick {
                                LockoutTick::Counting { .. } => {
                                    if let Some(message) = screen.lockout_message() {
                                        eprint!("\r{}", message);
                                    }
                                }
                                LockoutTick::Released => eprintln!(),
                                LockoutTick::Idle => {}
                            })
                            .await;
                    }
                }
                UnlockOutcome::ReturnToStart => bail!("Too many incorrect PINs"),
                UnlockOutcome::Ignored => {}
            }
        }
    }

    /// Drop every handle on the client and stop the sidecar
    async fn finish(self) -> Result<()> {
        let Session {
            service, client, ..
        } = self;
        drop(service);
        match Arc::try_unwrap(client) {
            Ok(client) => client.shutdown().await?,
            Err(_) => debug!("Sidecar still referenced, leaving it to drop"),
        }
        Ok(())
    }
}
