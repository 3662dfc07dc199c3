//! Multisig Migration CLI Application
//!
//! Walks a multisig wallet through a migration to a new signer configuration.

use clap::{Parser, Subcommand};
use multisig_migrate::cli::{self, AppState, CliResult, Target};
use multisig_migrate::config::MigrationConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig-migrate")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Resumable migration of multisig wallets to a new signer set", long_about = None)]
struct Cli {
    /// Data directory for the record store
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Ledger fixture file (defaults to <data-dir>/ledger.json)
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Original wallet ID
    #[arg(short, long, global = true)]
    wallet: Option<String>,

    /// Address of the signer driving the migration
    #[arg(short, long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet registry operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Start a migration
    Start,

    /// Continue a migration from the wallet's target pointer
    Continue,

    /// Show migration status
    Status,

    /// Run the pre-migration checks
    Precheck,

    /// Temporary wallet operations
    Draft {
        #[command(subcommand)]
        action: DraftCommands,
    },

    /// Commit the temporary wallet
    Finalize,

    /// Governance proxy operations
    Proxies {
        #[command(subcommand)]
        action: ProxyCommands,
    },

    /// Sweep all funds to the new wallet
    Sweep,

    /// Pending transaction operations
    Tx {
        #[command(subcommand)]
        action: TxCommands,
    },

    /// Check whether the original wallet is empty
    Completion {
        /// Poll until the wallet is empty
        #[arg(long)]
        watch: bool,
    },

    /// Archive the original wallet and finish
    Complete,

    /// Abort the migration
    Abort,
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Register an existing wallet from a configuration file
    Import {
        /// Wallet configuration (JSON)
        file: PathBuf,
    },

    /// Show a wallet
    Show,
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Create the temporary wallet
    Create {
        /// Wallet configuration (JSON)
        file: PathBuf,
    },

    /// Apply an edit (JSON)
    Update {
        file: PathBuf,
    },

    /// Show the temporary wallet
    Show,

    /// Join as a co-signer
    Join {
        /// Signer address
        #[arg(short, long)]
        address: String,

        /// Signer description
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// Register a proxy for the new wallet
    Register {
        #[arg(short, long)]
        address: String,

        /// Parameter reference of the proxy contract
        #[arg(short, long)]
        param_ref: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Finish proxy setup
    SetupDone,

    /// Move proxies from the original wallet
    Transfer,
}

#[derive(Subcommand)]
enum TxCommands {
    /// Add a signature
    Sign {
        tx_id: String,

        /// Signer address
        #[arg(short, long)]
        signer: String,
    },

    /// Broadcast a fully signed transaction
    Broadcast {
        tx_id: String,
    },
}

fn target(cli: &Cli) -> CliResult<Target> {
    match (&cli.wallet, &cli.owner) {
        (Some(wallet_id), Some(owner)) => Ok(Target {
            wallet_id: wallet_id.clone(),
            owner: owner.clone(),
        }),
        _ => Err("this command needs --wallet and --owner".into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    let state = AppState::new(config, cli.ledger.clone())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(&cli, &state))
}

async fn run(cli: &Cli, state: &AppState) -> CliResult<()> {
    match &cli.command {
        Commands::Wallet { action } => match action {
            WalletCommands::Import { file } => cli::cmd_wallet_import(state, file).await?,
            WalletCommands::Show => {
                let target = target(cli)?;
                cli::cmd_wallet_show(state, &target.owner, &target.wallet_id).await?;
            }
        },

        Commands::Start => cli::cmd_start(state, &target(cli)?).await?,
        Commands::Continue => cli::cmd_continue(state, &target(cli)?).await?,
        Commands::Status => cli::cmd_status(state, &target(cli)?).await?,
        Commands::Precheck => cli::cmd_precheck(state, &target(cli)?).await?,

        Commands::Draft { action } => {
            let target = target(cli)?;
            match action {
                DraftCommands::Create { file } => cli::cmd_draft_create(state, &target, file).await?,
                DraftCommands::Update { file } => cli::cmd_draft_update(state, &target, file).await?,
                DraftCommands::Show => cli::cmd_draft_show(state, &target).await?,
                DraftCommands::Join {
                    address,
                    description,
                } => cli::cmd_draft_join(state, &target, address, description).await?,
            }
        }

        Commands::Finalize => cli::cmd_finalize(state, &target(cli)?).await?,

        Commands::Proxies { action } => {
            let target = target(cli)?;
            match action {
                ProxyCommands::Register {
                    address,
                    param_ref,
                    description,
                } => cli::cmd_proxy_register(state, &target, address, param_ref, description).await?,
                ProxyCommands::SetupDone => cli::cmd_proxy_setup_done(state, &target).await?,
                ProxyCommands::Transfer => cli::cmd_proxy_transfer(state, &target).await?,
            }
        }

        Commands::Sweep => cli::cmd_sweep(state, &target(cli)?).await?,

        Commands::Tx { action } => match action {
            TxCommands::Sign { tx_id, signer } => cli::cmd_tx_sign(state, tx_id, signer).await?,
            TxCommands::Broadcast { tx_id } => cli::cmd_tx_broadcast(state, tx_id).await?,
        },

        Commands::Completion { watch } => cli::cmd_completion(state, &target(cli)?, *watch).await?,
        Commands::Complete => cli::cmd_complete(state, &target(cli)?).await?,
        Commands::Abort => cli::cmd_abort(state, &target(cli)?).await?,
    }

    Ok(())
}
