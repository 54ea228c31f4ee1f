//! Cycle scheduler
//!
//! Fires the orchestrator on a fixed interval through a single-slot gate: a
//! trigger that lands while a cycle is still running is skipped outright,
//! never queued. The manual `run` command goes through the same gate, so two
//! runs can never execute concurrently against the vault and store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::store::RunSummary;

/// Interval scheduler with skip-if-busy semantics
pub struct CycleScheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    grace: Duration,
    /// Single-slot gate: held for the whole of one cycle
    gate: Mutex<()>,
    skipped_ticks: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl CycleScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &SchedulerConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            orchestrator,
            interval: Duration::from_secs(config.interval_hours * 3600),
            grace: Duration::from_secs(config.shutdown_grace_secs),
            gate: Mutex::new(()),
            skipped_ticks: AtomicU64::new(0),
            shutdown_tx,
        })
    }

    /// Run one cycle now unless one is already in flight.
    ///
    /// Returns `None` when the trigger was skipped because the gate was busy.
    pub async fn try_run(&self) -> Result<Option<RunSummary>> {
        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let skipped = self.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(skipped_total = skipped, "Cycle already running - skipping trigger");
                return Ok(None);
            }
        };

        let summary = self.orchestrator.run_cycle().await?;
        Ok(Some(summary))
    }

    /// Triggers skipped because a cycle was still running
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Ask the scheduler loop to stop after the current cycle drains.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the scheduling loop until shutdown is requested.
    ///
    /// With `run_immediately`, one cycle executes before the first interval
    /// wait. On shutdown the loop stops triggering and waits up to the grace
    /// period for an in-flight cycle to finish and persist its run record.
    pub async fn start(self: Arc<Self>, run_immediately: bool) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if run_immediately {
            info!("Running initial cycle...");
            if let Err(e) = self.try_run().await {
                error!("Initial cycle failed: {}", e);
            }
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval() fires immediately; the first real wait starts here.
        ticker.tick().await;

        info!(
            interval_hours = self.interval.as_secs() / 3600,
            "Scheduler started - press Ctrl+C to stop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.try_run().await {
                            error!("Scheduled cycle failed: {}", e);
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            grace_secs = self.grace.as_secs(),
            "Shutdown requested - draining in-flight cycle"
        );
        match tokio::time::timeout(self.grace, self.gate.lock()).await {
            Ok(_) => info!("Scheduler stopped"),
            Err(_) => warn!("Grace period elapsed with a cycle still running"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as FarmerResult;
    use crate::platform::{ActivityOutcome, Capability};
    use crate::sink::LogSink;
    use crate::store::{Platform, Store};
    use crate::vault::{SigningContext, Vault};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct SlowCapability {
        delay: Duration,
    }

    #[async_trait]
    impl Capability for SlowCapability {
        fn platform(&self) -> Platform {
            Platform::Dex
        }

        fn activity_type(&self) -> &'static str {
            "mock_activity"
        }

        async fn execute(&self, _ctx: &SigningContext) -> FarmerResult<ActivityOutcome> {
            tokio::time::sleep(self.delay).await;
            Ok(ActivityOutcome::success("ok"))
        }
    }

    fn scheduler_harness(
        dir: &tempfile::TempDir,
        delay: Duration,
    ) -> (Arc<CycleScheduler>, Arc<Store>) {
        let mut vault = Vault::open(&dir.path().join("wallets.enc"), "master").unwrap();
        vault.create_wallets(1).unwrap();
        let store = Arc::new(Store::open(&dir.path().join("farmer.db")).unwrap());

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(vault),
            Arc::clone(&store),
            vec![Arc::new(SlowCapability { delay })],
            Arc::new(LogSink::disabled()),
            Duration::from_secs(5),
        ));

        let scheduler = CycleScheduler::new(
            orchestrator,
            &SchedulerConfig {
                interval_hours: 24,
                capability_timeout_secs: 5,
                shutdown_grace_secs: 2,
            },
        );
        (scheduler, store)
    }

    #[tokio::test]
    async fn overlapping_triggers_run_exactly_one_cycle() {
        let dir = tempdir().unwrap();
        let (scheduler, store) = scheduler_harness(&dir, Duration::from_millis(300));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.try_run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Two more triggers land while the first cycle is still running.
        assert!(scheduler.try_run().await.unwrap().is_none());
        assert!(scheduler.try_run().await.unwrap().is_none());

        let summary = first.await.unwrap().unwrap();
        assert!(summary.is_some());
        assert_eq!(scheduler.skipped_ticks(), 2);
        assert_eq!(store.run_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn gate_reopens_after_a_cycle_finishes() {
        let dir = tempdir().unwrap();
        let (scheduler, store) = scheduler_harness(&dir, Duration::from_millis(10));

        assert!(scheduler.try_run().await.unwrap().is_some());
        assert!(scheduler.try_run().await.unwrap().is_some());

        assert_eq!(scheduler.skipped_ticks(), 0);
        assert_eq!(store.run_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop_without_running_a_cycle() {
        let dir = tempdir().unwrap();
        let (scheduler, store) = scheduler_harness(&dir, Duration::from_millis(10));

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start(false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.request_shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop in time")
            .unwrap()
            .unwrap();
        assert_eq!(store.run_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_drains_the_in_flight_cycle() {
        let dir = tempdir().unwrap();
        let (scheduler, store) = scheduler_harness(&dir, Duration::from_millis(200));

        let runner = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.try_run().await })
        };
        let loop_handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.start(false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        scheduler.request_shutdown();
        loop_handle
            .await
            .unwrap()
            .unwrap();

        // The drain waited for the running cycle; its run record is durable.
        runner.await.unwrap().unwrap();
        assert_eq!(store.run_count().unwrap(), 1);
    }
}
