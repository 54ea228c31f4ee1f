//! Test-chain interactions via JSON-RPC
//!
//! Keeps each wallet active on the test network: check the balance, then sign
//! and submit a small self-transfer. Anything the network refuses is an
//! expected failure and becomes a failed outcome.

use async_trait::async_trait;
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionRequest, U256};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::error::{Error, Result};
use crate::store::Platform;
use crate::vault::SigningContext;

use super::{ActivityOutcome, Capability};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Minimum balance required before attempting a self-transfer (0.001 ETH)
const MIN_BALANCE_WEI: u128 = 1_000_000_000_000_000;

/// Self-transfer amount (0.0001 ETH)
const SELF_TRANSFER_WEI: u128 = 100_000_000_000_000;

const WEI_PER_ETH: f64 = 1e18;

/// Test-chain JSON-RPC client
pub struct TestChainClient {
    client: reqwest::Client,
    rpc_url: String,
    chain_id: u64,
}

impl TestChainClient {
    pub fn new(config: &ChainConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            rpc_url: config.rpc_url.clone(),
            chain_id: config.chain_id,
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Capability(format!("{} request failed: {}", method, e)))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Capability(format!("{} returned invalid JSON: {}", method, e)))?;

        if let Some(error) = payload.get("error") {
            return Err(Error::Capability(format!("{} rejected: {}", method, error)));
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn balance_wei(&self, address: &str) -> Result<u128> {
        let result = self
            .rpc_call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_quantity(&result)
    }

    async fn transaction_count(&self, address: &str) -> Result<u128> {
        let result = self
            .rpc_call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&result)
    }

    async fn gas_price(&self) -> Result<u128> {
        let result = self.rpc_call("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    /// Sign and submit a self-transfer; returns the transaction hash.
    async fn self_transfer(&self, ctx: &SigningContext) -> Result<String> {
        let address = ctx.signer().address();
        let nonce = self.transaction_count(ctx.address()).await?;
        let gas_price = self.gas_price().await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(address)
            .to(address)
            .value(U256::from(SELF_TRANSFER_WEI))
            .gas(21_000u64)
            .gas_price(U256::from(gas_price))
            .nonce(U256::from(nonce))
            .chain_id(self.chain_id)
            .into();

        let signer = ctx.signer().clone().with_chain_id(self.chain_id);
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| Error::Capability(format!("transaction signing failed: {}", e)))?;
        let raw = tx.rlp_signed(&signature);

        debug!(wallet = %ctx.address(), nonce, "Submitting self-transfer");
        let result = self
            .rpc_call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw.as_ref()))]),
            )
            .await?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Capability("eth_sendRawTransaction returned no hash".to_string()))
    }
}

#[async_trait]
impl Capability for TestChainClient {
    fn platform(&self) -> Platform {
        Platform::TestChain
    }

    fn activity_type(&self) -> &'static str {
        "chain_interaction"
    }

    async fn execute(&self, ctx: &SigningContext) -> Result<ActivityOutcome> {
        let balance = match self.balance_wei(ctx.address()).await {
            Ok(balance) => balance,
            Err(e) => return Ok(ActivityOutcome::failed(e.to_string())),
        };
        let balance_eth = balance as f64 / WEI_PER_ETH;
        debug!(wallet = %ctx.address(), balance_eth, "Checked test-chain balance");

        if balance < MIN_BALANCE_WEI {
            return Ok(ActivityOutcome::failed(format!(
                "insufficient balance for self-transfer: {} ETH",
                balance_eth
            )));
        }

        match self.self_transfer(ctx).await {
            Ok(tx_hash) => {
                info!(wallet = %ctx.address(), %tx_hash, "Self-transfer submitted");
                Ok(ActivityOutcome::success(format!(
                    "self-transfer submitted, balance {} ETH",
                    balance_eth
                ))
                .with_tx_reference(tx_hash))
            }
            Err(e) => Ok(ActivityOutcome::failed(e.to_string())),
        }
    }
}

fn parse_quantity(value: &Value) -> Result<u128> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::Capability(format!("expected hex quantity, got {}", value)))?;
    u128::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|e| Error::Capability(format!("invalid hex quantity {}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quantity_handles_rpc_hex() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x2a")).unwrap(), 42);
        assert_eq!(
            parse_quantity(&json!("0xde0b6b3a7640000")).unwrap(),
            1_000_000_000_000_000_000
        );
        assert!(parse_quantity(&json!(42)).is_err());
        assert!(parse_quantity(&json!("0xzz")).is_err());
    }

    #[tokio::test]
    async fn unreachable_rpc_is_an_expected_failure() {
        let client = TestChainClient::new(&ChainConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            chain_id: 1234,
        });

        let dir = tempfile::tempdir().unwrap();
        let mut vault =
            crate::vault::Vault::open(&dir.path().join("wallets.enc"), "master").unwrap();
        vault.create_wallets(1).unwrap();
        let ctx = vault.load_signer(0).unwrap();

        let outcome = client.execute(&ctx).await.unwrap();
        assert!(!outcome.succeeded());
        assert!(outcome.details.contains("eth_getBalance"));
    }
}
