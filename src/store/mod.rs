//! State store
//!
//! Durable record of activity history, per-wallet counters, per-platform
//! aggregates, and scheduler run history. Wallet state is always derivable by
//! replaying the activity log; `replay_wallet_state` is the check.

pub mod db;
pub mod types;

pub use db::Store;
pub use types::{
    ActivityRecord, ActivityStatus, Platform, PlatformStats, RunSummary, StateDelta, StatsView,
    WalletState,
};
