//! Run orchestrator
//!
//! Executes one complete cycle: every wallet through every configured
//! platform capability, strictly sequentially, with every attempt recorded
//! whether it succeeds or not. Capability failures never abort the cycle; a
//! vault failure aborts only the affected wallet's remaining platforms.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::platform::{ActivityOutcome, Capability};
use crate::sink::LogSink;
use crate::store::{ActivityRecord, ActivityStatus, Platform, RunSummary, StateDelta, Store};
use crate::vault::{SigningContext, Vault, WalletRecord};

/// Drives one execution cycle across all wallets and platforms
pub struct Orchestrator {
    vault: Arc<Vault>,
    store: Arc<Store>,
    capabilities: Vec<Arc<dyn Capability>>,
    sink: Arc<LogSink>,
    capability_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        vault: Arc<Vault>,
        store: Arc<Store>,
        capabilities: Vec<Arc<dyn Capability>>,
        sink: Arc<LogSink>,
        capability_timeout: Duration,
    ) -> Self {
        Self {
            vault,
            store,
            capabilities,
            sink,
            capability_timeout,
        }
    }

    /// Run one cycle and persist its run record.
    ///
    /// Returns the summary that was written. Wallets are processed in
    /// creation order, platforms in configured order; neither ordering is a
    /// correctness requirement.
    pub async fn run_cycle(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let wallets = self.vault.list_wallets();

        info!(%run_id, wallets = wallets.len(), "Starting farming cycle");
        if wallets.is_empty() {
            warn!("No wallets configured - run 'farmer setup' first");
        }

        let mut succeeded: u64 = 0;
        let mut failed: u64 = 0;
        let mut errors: Vec<String> = Vec::new();
        let mut activities: Vec<ActivityRecord> = Vec::new();

        for wallet in &wallets {
            debug!(wallet = %wallet.address, "Processing wallet");

            for capability in &self.capabilities {
                // Decrypt-on-use: the signing context lives for exactly one
                // capability invocation.
                let ctx = match self.vault.load_signer(wallet.id) {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        warn!(
                            wallet = %wallet.address,
                            error = %e,
                            "Vault failure - aborting this wallet's remaining activities"
                        );
                        let record = vault_failure_record(wallet, &e.to_string());
                        self.record_attempt(&record, &mut errors);
                        failed += 1;
                        errors.push(format!("wallet {}: {}", wallet.address, e));
                        activities.push(record);
                        break;
                    }
                };

                let outcome = self.invoke(capability.as_ref(), &ctx).await;
                drop(ctx);

                if outcome.status == ActivityStatus::Success {
                    succeeded += 1;
                } else {
                    failed += 1;
                }

                let record = ActivityRecord {
                    wallet_id: wallet.id,
                    wallet_address: wallet.address.clone(),
                    platform: capability.platform(),
                    activity_type: capability.activity_type().to_string(),
                    status: outcome.status,
                    timestamp: Utc::now(),
                    tx_reference: outcome.tx_reference,
                    details: outcome.details,
                    points_delta: outcome.points_delta,
                };
                self.record_attempt(&record, &mut errors);
                activities.push(record);
            }
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            wallets_processed: wallets.len() as u64,
            activities_succeeded: succeeded,
            activities_failed: failed,
            error_summary: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        };

        if let Err(e) = self.store.record_run_summary(&summary) {
            error!("Failed to persist run record: {}", e);
        }

        // Mirror only after the run record is durable.
        for record in &activities {
            self.sink.mirror_activity(record).await;
        }
        self.sink.mirror_run(&summary).await;

        info!(
            %run_id,
            wallets = summary.wallets_processed,
            succeeded = summary.activities_succeeded,
            failed = summary.activities_failed,
            "Farming cycle complete"
        );

        Ok(summary)
    }

    /// Invoke one capability with the per-call timeout. Errors and timeouts
    /// become failed outcomes; only the capability decides what succeeds.
    async fn invoke(&self, capability: &dyn Capability, ctx: &SigningContext) -> ActivityOutcome {
        match tokio::time::timeout(self.capability_timeout, capability.execute(ctx)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(platform = %capability.platform(), error = %e, "Capability raised");
                ActivityOutcome::failed(e.to_string())
            }
            Err(_) => {
                warn!(platform = %capability.platform(), "Capability timed out");
                ActivityOutcome::failed(
                    Error::CapabilityTimeout(self.capability_timeout.as_secs()).to_string(),
                )
            }
        }
    }

    /// Persist one attempt: activity row plus the matching state and platform
    /// counter updates. Store failures are logged and flagged in the run
    /// record; the cycle continues best-effort.
    fn record_attempt(&self, record: &ActivityRecord, errors: &mut Vec<String>) {
        if let Err(e) = self.store.append_activity(record) {
            error!("Failed to append activity record: {}", e);
            errors.push(format!("store: {}", e));
            return;
        }

        let delta = StateDelta {
            succeeded: record.status == ActivityStatus::Success,
            points: record.points_delta,
            at: record.timestamp,
        };
        if let Err(e) = self
            .store
            .update_wallet_state(record.wallet_id, record.platform, &delta)
        {
            error!("Failed to update wallet state: {}", e);
            errors.push(format!("store: {}", e));
        }
        if let Err(e) =
            self.store
                .update_platform_stats(record.platform, delta.succeeded, record.timestamp)
        {
            error!("Failed to update platform stats: {}", e);
            errors.push(format!("store: {}", e));
        }
    }
}

fn vault_failure_record(wallet: &WalletRecord, details: &str) -> ActivityRecord {
    ActivityRecord {
        wallet_id: wallet.id,
        wallet_address: wallet.address.clone(),
        platform: Platform::System,
        activity_type: "vault_access".to_string(),
        status: ActivityStatus::Failed,
        timestamp: Utc::now(),
        tx_reference: None,
        details: details.to_string(),
        points_delta: 0.0,
    }
}
