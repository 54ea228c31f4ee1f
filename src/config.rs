//! Configuration loading and validation
//!
//! All options come from the process environment (a `.env` file is loaded by
//! main before this runs). Missing required variables are collected and
//! reported together in a single fatal error.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the keystore and database files
    pub data_dir: PathBuf,
    pub vault: VaultConfig,
    pub chain: ChainConfig,
    pub dex: DexConfig,
    pub market: MarketConfig,
    pub sink: SinkConfig,
    pub scheduler: SchedulerConfig,
}

/// Vault and wallet-set configuration
#[derive(Clone)]
pub struct VaultConfig {
    /// Operator secret the encryption key is derived from
    pub master_secret: String,
    /// Default wallet count for `setup`
    pub num_wallets: usize,
}

// Never print the master secret, not even in debug output.
impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_secret", &"***")
            .field("num_wallets", &self.num_wallets)
            .finish()
    }
}

/// Test-chain JSON-RPC configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// DEX points API configuration
#[derive(Debug, Clone)]
pub struct DexConfig {
    pub api_url: String,
    pub api_key: String,
}

/// Prediction-market API configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub api_url: String,
    pub api_key: String,
}

/// Remote activity-log sink configuration
#[derive(Clone)]
pub struct SinkConfig {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

/// Scheduler and cycle configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Hours between scheduled cycles
    pub interval_hours: u64,
    /// Per-capability call timeout
    pub capability_timeout_secs: u64,
    /// How long a shutdown waits for an in-flight cycle to drain
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Every missing required variable is reported in one error so the
    /// operator can fix them all at once.
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();

        let master_secret = require(&mut missing, "MASTER_SECRET");
        let sink_url = require(&mut missing, "LOG_SINK_URL");
        let sink_token = require(&mut missing, "LOG_SINK_TOKEN");

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let interval_hours = env_parse("RUN_INTERVAL_HOURS", 24)?;
        if interval_hours == 0 {
            return Err(Error::Config(
                "RUN_INTERVAL_HOURS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
            vault: VaultConfig {
                master_secret,
                num_wallets: env_parse("NUM_WALLETS", 5)?,
            },
            chain: ChainConfig {
                rpc_url: env_or("CHAIN_RPC_URL", "https://rpc.megaeth.testnet"),
                chain_id: env_parse("CHAIN_ID", 1234)?,
            },
            dex: DexConfig {
                api_url: trim_base_url(env_or("DEX_API_URL", "https://api.lighter.xyz")),
                api_key: env_or("DEX_API_KEY", ""),
            },
            market: MarketConfig {
                api_url: trim_base_url(env_or("MARKET_API_URL", "https://api.polymarket.com")),
                api_key: env_or("MARKET_API_KEY", ""),
            },
            sink: SinkConfig {
                url: sink_url,
                token: sink_token,
            },
            scheduler: SchedulerConfig {
                interval_hours,
                capability_timeout_secs: env_parse("CAPABILITY_TIMEOUT_SECS", 30)?,
                shutdown_grace_secs: env_parse("SHUTDOWN_GRACE_SECS", 30)?,
            },
        })
    }

    /// Path to the encrypted wallet keystore
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("wallets.enc")
    }

    /// Path to the SQLite state database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("farmer.db")
    }
}

fn require(missing: &mut Vec<&'static str>, key: &'static str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => {
            missing.push(key);
            String::new()
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {}: {}", key, v))),
        Err(_) => Ok(default),
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; serialize them.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn clear_env() {
        for key in [
            "MASTER_SECRET",
            "LOG_SINK_URL",
            "LOG_SINK_TOKEN",
            "DATA_DIR",
            "NUM_WALLETS",
            "RUN_INTERVAL_HOURS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_vars_are_all_listed() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let err = Config::from_env().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MASTER_SECRET"));
        assert!(msg.contains("LOG_SINK_URL"));
        assert!(msg.contains("LOG_SINK_TOKEN"));
    }

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("MASTER_SECRET", "test-secret");
        std::env::set_var("LOG_SINK_URL", "https://sink.example/api");
        std::env::set_var("LOG_SINK_TOKEN", "token");

        let config = Config::from_env().unwrap();
        assert_eq!(config.vault.num_wallets, 5);
        assert_eq!(config.scheduler.interval_hours, 24);
        assert_eq!(config.keystore_path(), PathBuf::from("data/wallets.enc"));

        clear_env();
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("MASTER_SECRET", "test-secret");
        std::env::set_var("LOG_SINK_URL", "https://sink.example/api");
        std::env::set_var("LOG_SINK_TOKEN", "token");
        std::env::set_var("NUM_WALLETS", "not-a-number");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("NUM_WALLETS"));

        clear_env();
    }

    #[test]
    fn secrets_are_masked_in_debug_output() {
        let vault = VaultConfig {
            master_secret: "super-secret".to_string(),
            num_wallets: 3,
        };
        let debug = format!("{:?}", vault);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }
}
