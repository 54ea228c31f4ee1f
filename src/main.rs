//! Airdrop Farmer - drives encrypted wallets through scripted platform interactions
//!
//! # WARNING
//! - Airdrop farming may violate platform terms of service.
//! - Wallets hold real keys. Guard the master secret; without it the
//!   keystore cannot be decrypted.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

// Use the library crate
use airdrop_farmer::cli::commands;
use airdrop_farmer::config::Config;

/// Airdrop Farmer - automated wallet activity across test chains and APIs
#[derive(Parser)]
#[command(name = "farmer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and encrypt the wallet set
    Setup {
        /// Number of wallets to create (defaults to NUM_WALLETS)
        #[arg(long)]
        wallets: Option<usize>,
    },

    /// Execute one farming cycle and exit
    Run,

    /// Start the recurring scheduler
    Schedule {
        /// Hours between cycles (defaults to RUN_INTERVAL_HOURS)
        #[arg(long)]
        interval: Option<u64>,

        /// Don't run a cycle immediately on start
        #[arg(long)]
        no_immediate: bool,
    },

    /// Show aggregate statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing; LOG_LEVEL controls this crate's directive
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let directive = format!("airdrop_farmer={}", log_level)
        .parse()
        .unwrap_or_else(|_| "airdrop_farmer=info".parse().unwrap());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load and validate configuration
    info!("Validating configuration...");
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Setup { wallets } => commands::setup(&config, wallets).await,
        Commands::Run => commands::run(&config).await,
        Commands::Schedule {
            interval,
            no_immediate,
        } => commands::schedule(&config, interval, no_immediate).await,
        Commands::Stats => commands::stats(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
