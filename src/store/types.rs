//! Record types for the state store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform an activity ran against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Test blockchain (JSON-RPC)
    TestChain,

    /// DEX points API
    Dex,

    /// Prediction-market API
    Market,

    /// Internal bookkeeping, e.g. vault failures
    System,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::TestChain => "test-chain",
            Platform::Dex => "dex",
            Platform::Market => "market",
            Platform::System => "system",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "test-chain" => Ok(Platform::TestChain),
            "dex" => Ok(Platform::Dex),
            "market" => Ok(Platform::Market),
            "system" => Ok(Platform::System),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Outcome status of one attempted interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Failed,
    Pending,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(ActivityStatus::Success),
            "failed" => Ok(ActivityStatus::Failed),
            "pending" => Ok(ActivityStatus::Pending),
            other => Err(format!("unknown activity status: {}", other)),
        }
    }
}

/// One attempted wallet/platform interaction, success or not.
///
/// Carries its own state delta (`points_delta`, and success implies one
/// transaction) so wallet state can be recomputed from the log alone.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub wallet_id: u32,
    pub wallet_address: String,
    pub platform: Platform,
    pub activity_type: String,
    pub status: ActivityStatus,
    pub timestamp: DateTime<Utc>,
    pub tx_reference: Option<String>,
    pub details: String,
    pub points_delta: f64,
}

/// Derived per wallet-platform counters
#[derive(Debug, Clone, PartialEq)]
pub struct WalletState {
    pub wallet_id: u32,
    pub platform: Platform,
    pub last_activity: Option<DateTime<Utc>>,
    /// Successful activities to date
    pub tx_count: u64,
    /// Cumulative points/volume metric
    pub points: f64,
}

impl WalletState {
    pub fn empty(wallet_id: u32, platform: Platform) -> Self {
        Self {
            wallet_id,
            platform,
            last_activity: None,
            tx_count: 0,
            points: 0.0,
        }
    }
}

/// Counter update for exactly one activity attempt
#[derive(Debug, Clone, Copy)]
pub struct StateDelta {
    pub succeeded: bool,
    pub points: f64,
    pub at: DateTime<Utc>,
}

/// Derived per-platform counters
#[derive(Debug, Clone)]
pub struct PlatformStats {
    pub platform: Platform,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// Summary persisted once per orchestrator invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wallets_processed: u64,
    pub activities_succeeded: u64,
    pub activities_failed: u64,
    pub error_summary: Option<String>,
}

/// Read-only aggregate view for the stats command
#[derive(Debug, Clone)]
pub struct StatsView {
    pub total_activities: u64,
    pub wallets_seen: u64,
    pub platforms: Vec<PlatformStats>,
    pub recent_runs: Vec<RunSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_strings() {
        for platform in [
            Platform::TestChain,
            Platform::Dex,
            Platform::Market,
            Platform::System,
        ] {
            let parsed: Platform = platform.as_str().parse().unwrap();
            assert_eq!(parsed, platform);
        }
        assert!("mainnet".parse::<Platform>().is_err());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ActivityStatus::Success,
            ActivityStatus::Failed,
            ActivityStatus::Pending,
        ] {
            let parsed: ActivityStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
