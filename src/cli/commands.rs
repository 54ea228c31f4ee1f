//! CLI command implementations

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::platform::{Capability, DexClient, MarketClient, TestChainClient};
use crate::scheduler::CycleScheduler;
use crate::sink::LogSink;
use crate::store::Store;
use crate::vault::Vault;

/// Create and encrypt the wallet set.
///
/// Idempotent: if wallets already exist, they are listed and left untouched.
pub async fn setup(config: &Config, wallets: Option<usize>) -> Result<()> {
    let mut vault = Vault::open(&config.keystore_path(), &config.vault.master_secret)?;

    if vault.wallet_count() > 0 {
        info!("Found {} existing wallets - nothing to do", vault.wallet_count());
        for record in vault.list_wallets() {
            println!("  {}. {}", record.id + 1, record.address);
        }
        return Ok(());
    }

    let count = wallets.unwrap_or(config.vault.num_wallets);
    info!("Creating {} new wallets...", count);
    let created = vault.create_wallets(count)?;

    println!("Setup complete - created {} wallets:", created.len());
    for record in &created {
        println!("  {}. {}", record.id + 1, record.address);
    }

    Ok(())
}

/// Execute one farming cycle and print its summary.
///
/// Capability failures are part of a normal cycle and never produce a
/// non-zero exit.
pub async fn run(config: &Config) -> Result<()> {
    let scheduler = build_scheduler(config)?;

    match scheduler.try_run().await? {
        Some(summary) => {
            println!("Cycle {} complete", summary.run_id);
            println!("  wallets processed:    {}", summary.wallets_processed);
            println!("  activities succeeded: {}", summary.activities_succeeded);
            println!("  activities failed:    {}", summary.activities_failed);
            if let Some(errors) = &summary.error_summary {
                println!("  errors: {}", errors);
            }
        }
        None => warn!("Another cycle is already running"),
    }

    Ok(())
}

/// Start the recurring scheduler and block until Ctrl+C.
pub async fn schedule(config: &Config, interval: Option<u64>, no_immediate: bool) -> Result<()> {
    let mut scheduler_config = config.scheduler.clone();
    if let Some(hours) = interval {
        if hours == 0 {
            anyhow::bail!("--interval must be at least 1 hour");
        }
        scheduler_config.interval_hours = hours;
    }

    let mut config = config.clone();
    config.scheduler = scheduler_config;
    let scheduler = build_scheduler(&config)?;

    {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Termination signal received");
                scheduler.request_shutdown();
            }
        });
    }

    scheduler.start(!no_immediate).await?;
    Ok(())
}

/// Show aggregate statistics.
pub async fn stats(config: &Config) -> Result<()> {
    let vault = Vault::open(&config.keystore_path(), &config.vault.master_secret)?;
    let store = Store::open(&config.db_path())?;
    let stats = store.query_stats()?;

    println!("Wallets: {}", vault.wallet_count());
    for record in vault.list_wallets() {
        println!("  {}. {}", record.id + 1, record.address);
    }

    println!("\nActivities recorded: {}", stats.total_activities);
    println!("Platforms:");
    for platform in &stats.platforms {
        let last_run = platform
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<12} {} succeeded, {} failed, last run {}",
            platform.platform.to_string(),
            platform.success_count,
            platform.failure_count,
            last_run
        );
    }

    println!("\nRecent runs:");
    if stats.recent_runs.is_empty() {
        println!("  none");
    }
    for run in &stats.recent_runs {
        println!(
            "  {} wallets={} ok={} failed={}{}",
            run.started_at.to_rfc3339(),
            run.wallets_processed,
            run.activities_succeeded,
            run.activities_failed,
            run.error_summary
                .as_deref()
                .map(|e| format!(" errors: {}", e))
                .unwrap_or_default()
        );
    }

    Ok(())
}

/// Wire vault, store, capabilities, and sink into a ready scheduler.
fn build_scheduler(config: &Config) -> Result<Arc<CycleScheduler>> {
    let vault = Arc::new(Vault::open(
        &config.keystore_path(),
        &config.vault.master_secret,
    )?);
    let store = Arc::new(Store::open(&config.db_path())?);
    let sink = Arc::new(LogSink::new(&config.sink));

    // Fixed platform order: test chain, then DEX, then market.
    let capabilities: Vec<Arc<dyn Capability>> = vec![
        Arc::new(TestChainClient::new(&config.chain)),
        Arc::new(DexClient::new(&config.dex)),
        Arc::new(MarketClient::new(&config.market)),
    ];

    let orchestrator = Arc::new(Orchestrator::new(
        vault,
        store,
        capabilities,
        sink,
        Duration::from_secs(config.scheduler.capability_timeout_secs),
    ));

    Ok(CycleScheduler::new(orchestrator, &config.scheduler))
}
