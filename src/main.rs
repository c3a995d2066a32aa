//! Stakehouse server binary

use clap::{Parser, Subcommand, ValueEnum};
use stakehouse::{
    api::ApiServer,
    config::{ConfigLoader, StakehouseConfig, StorageBackend},
    errors::WagerResult,
    Casino,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

/// Stakehouse wagering engine
#[derive(Parser)]
#[command(name = "stakehouse")]
#[command(about = "Wagering engine with a reversible ledger", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "stakehouse.toml")]
    config: PathBuf,

    /// Data directory for the ledger
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Ledger store backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Recompute an account's balance from its ledger and compare
    Reconcile {
        #[arg(short, long)]
        account: i64,
    },

    /// Write the effective configuration to a file
    WriteConfig {
        #[arg(short, long, default_value = "stakehouse.toml")]
        out: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    Rocksdb,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new().with_path(&cli.config).load()?;
    init_tracing(&config, cli.verbose);

    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = match backend {
            BackendArg::Memory => StorageBackend::Memory,
            BackendArg::Rocksdb => StorageBackend::RocksDb,
        };
    }

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            config.validate()?;
            serve(config).await
        }
        Commands::Reconcile { account } => {
            reconcile(&config, account)?;
            Ok(())
        }
        Commands::WriteConfig { out } => {
            ConfigLoader::new().save(&config, &out)?;
            tracing::info!(path = %out, "configuration written");
            Ok(())
        }
    }
}

fn init_tracing(config: &StakehouseConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("stakehouse=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.monitoring.log_filter))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: StakehouseConfig) -> Result<(), Box<dyn std::error::Error>> {
    let casino = Arc::new(Casino::from_config(&config)?);
    ApiServer::new(config.api.clone(), config.monitoring.clone(), casino).run().await
}

fn reconcile(config: &StakehouseConfig, account: i64) -> WagerResult<()> {
    let casino = Casino::from_config(config)?;
    let rec = casino.reconcile(account)?;
    if rec.is_consistent() {
        tracing::info!(account, balance = rec.balance, "balance matches ledger");
    } else {
        tracing::error!(account, balance = rec.balance, expected = rec.expected(), "balance does not match ledger");
    }
    println!("{}", serde_json::to_string_pretty(&rec)?);
    Ok(())
}
