//! Prediction-market interaction tracker
//!
//! Tracks a wallet's trades, open positions, and the active market list for
//! airdrop eligibility. Read-only against the market API; a missing endpoint
//! reads as an empty list.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::MarketConfig;
use crate::error::{Error, Result};
use crate::store::Platform;
use crate::vault::SigningContext;

use super::{ActivityOutcome, Capability};

const HTTP_TIMEOUT_SECS: u64 = 30;
const MARKETS_LIMIT: u32 = 10;

/// Prediction-market API client
pub struct MarketClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl MarketClient {
    pub fn new(config: &MarketConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn get_list(&self, url: String) -> Result<Vec<Value>> {
        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Capability(format!("GET {} failed: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%url, "Market endpoint not found, treating as empty");
            return Ok(Vec::new());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Capability(format!("GET {} returned {}", url, status)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Capability(format!("GET {} returned invalid JSON: {}", url, e)))
    }

    async fn user_trades(&self, address: &str) -> Result<Vec<Value>> {
        self.get_list(format!("{}/trades/{}", self.api_url, address))
            .await
    }

    async fn user_positions(&self, address: &str) -> Result<Vec<Value>> {
        self.get_list(format!("{}/positions/{}", self.api_url, address))
            .await
    }

    async fn active_markets(&self) -> Result<Vec<Value>> {
        self.get_list(format!(
            "{}/markets?limit={}&active=true",
            self.api_url, MARKETS_LIMIT
        ))
        .await
    }
}

#[async_trait]
impl Capability for MarketClient {
    fn platform(&self) -> Platform {
        Platform::Market
    }

    fn activity_type(&self) -> &'static str {
        "interaction_tracking"
    }

    async fn execute(&self, ctx: &SigningContext) -> Result<ActivityOutcome> {
        let trades = match self.user_trades(ctx.address()).await {
            Ok(trades) => trades,
            Err(e) => return Ok(ActivityOutcome::failed(e.to_string())),
        };
        let positions = match self.user_positions(ctx.address()).await {
            Ok(positions) => positions,
            Err(e) => return Ok(ActivityOutcome::failed(e.to_string())),
        };
        let markets = match self.active_markets().await {
            Ok(markets) => markets,
            Err(e) => return Ok(ActivityOutcome::failed(e.to_string())),
        };

        info!(
            wallet = %ctx.address(),
            trades = trades.len(),
            positions = positions.len(),
            "Market interaction tracking complete"
        );

        Ok(ActivityOutcome::success(format!(
            "trades={}, positions={}, active_markets={}",
            trades.len(),
            positions.len(),
            markets.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_api_is_an_expected_failure() {
        let client = MarketClient::new(&MarketConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });

        let dir = tempfile::tempdir().unwrap();
        let mut vault =
            crate::vault::Vault::open(&dir.path().join("wallets.enc"), "master").unwrap();
        vault.create_wallets(1).unwrap();
        let ctx = vault.load_signer(0).unwrap();

        let outcome = client.execute(&ctx).await.unwrap();
        assert!(!outcome.succeeded());
    }
}
