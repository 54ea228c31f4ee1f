//! Platform capability interface
//!
//! Every external platform the farmer drives a wallet through implements the
//! [`Capability`] trait; the orchestrator is written once against it.
//! Expected failures (network errors, missing endpoints, insufficient
//! balance) come back as failed outcomes, not errors - only genuinely
//! exceptional conditions may return `Err`, and the orchestrator converts
//! those into failed activity records too.

pub mod dex;
pub mod market;
pub mod testchain;

use async_trait::async_trait;

use crate::error::Result;
use crate::store::{ActivityStatus, Platform};
use crate::vault::SigningContext;

pub use dex::DexClient;
pub use market::MarketClient;
pub use testchain::TestChainClient;

/// Outcome of a single capability invocation
#[derive(Debug, Clone)]
pub struct ActivityOutcome {
    pub status: ActivityStatus,
    pub tx_reference: Option<String>,
    pub details: String,
    /// Contribution to the wallet's cumulative points/volume metric
    pub points_delta: f64,
}

impl ActivityOutcome {
    pub fn success(details: impl Into<String>) -> Self {
        Self {
            status: ActivityStatus::Success,
            tx_reference: None,
            details: details.into(),
            points_delta: 0.0,
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            status: ActivityStatus::Failed,
            tx_reference: None,
            details: details.into(),
            points_delta: 0.0,
        }
    }

    pub fn with_tx_reference(mut self, tx_reference: impl Into<String>) -> Self {
        self.tx_reference = Some(tx_reference.into());
        self
    }

    pub fn with_points(mut self, points_delta: f64) -> Self {
        self.points_delta = points_delta;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == ActivityStatus::Success
    }
}

/// Uniform interface each platform integration exposes to the orchestrator
#[async_trait]
pub trait Capability: Send + Sync {
    /// Platform this capability reports under
    fn platform(&self) -> Platform;

    /// Short activity code recorded with every attempt
    fn activity_type(&self) -> &'static str;

    /// Drive one wallet through this platform
    async fn execute(&self, signer: &SigningContext) -> Result<ActivityOutcome>;
}
