//! Remote activity-log sink
//!
//! Best-effort mirror of activity records and run summaries to the operator's
//! dashboard. Delivery failures are logged and never affect the cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::store::{ActivityRecord, RunSummary};

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Structured record the sink accepts
#[derive(Debug, Serialize)]
struct SinkRecord<'a> {
    wallet: &'a str,
    platform: &'a str,
    activity: &'a str,
    status: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_reference: Option<&'a str>,
    details: &'a str,
}

#[derive(Debug, Serialize)]
struct SinkRunRecord<'a> {
    record_type: &'static str,
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    wallets_processed: u64,
    activities_succeeded: u64,
    activities_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_summary: Option<&'a str>,
}

/// Best-effort HTTP log sink client
pub struct LogSink {
    client: reqwest::Client,
    url: String,
    token: String,
    enabled: bool,
}

impl LogSink {
    pub fn new(config: &SinkConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            enabled: true,
        }
    }

    /// A sink that drops everything. Used where no remote mirror is wired up.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: String::new(),
            token: String::new(),
            enabled: false,
        }
    }

    /// Mirror one activity record. Failures are logged, never returned.
    pub async fn mirror_activity(&self, record: &ActivityRecord) {
        if !self.enabled {
            return;
        }

        let payload = SinkRecord {
            wallet: &record.wallet_address,
            platform: record.platform.as_str(),
            activity: &record.activity_type,
            status: record.status.as_str(),
            timestamp: record.timestamp,
            tx_reference: record.tx_reference.as_deref(),
            details: &record.details,
        };

        if let Err(e) = self.deliver(&payload).await {
            warn!("Failed to mirror activity to log sink: {}", e);
        } else {
            debug!(wallet = %record.wallet_address, platform = %record.platform, "Mirrored activity");
        }
    }

    /// Mirror one run summary. Failures are logged, never returned.
    pub async fn mirror_run(&self, summary: &RunSummary) {
        if !self.enabled {
            return;
        }

        let payload = SinkRunRecord {
            record_type: "scheduler_run",
            run_id: summary.run_id.to_string(),
            started_at: summary.started_at,
            finished_at: summary.finished_at,
            wallets_processed: summary.wallets_processed,
            activities_succeeded: summary.activities_succeeded,
            activities_failed: summary.activities_failed,
            error_summary: summary.error_summary.as_deref(),
        };

        if let Err(e) = self.deliver(&payload).await {
            warn!("Failed to mirror run summary to log sink: {}", e);
        }
    }

    async fn deliver<T: Serialize>(&self, payload: &T) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::SinkDelivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SinkDelivery(format!("sink returned {}", status)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ActivityStatus, Platform};

    fn sample_record() -> ActivityRecord {
        ActivityRecord {
            wallet_id: 0,
            wallet_address: "0xabc".to_string(),
            platform: Platform::Dex,
            activity_type: "points_farming".to_string(),
            status: ActivityStatus::Success,
            timestamp: Utc::now(),
            tx_reference: None,
            details: "points=0".to_string(),
            points_delta: 0.0,
        }
    }

    #[tokio::test]
    async fn disabled_sink_drops_silently() {
        let sink = LogSink::disabled();
        sink.mirror_activity(&sample_record()).await;
    }

    #[tokio::test]
    async fn unreachable_sink_never_errors_out() {
        let sink = LogSink::new(&SinkConfig {
            url: "http://127.0.0.1:1/api/log".to_string(),
            token: "token".to_string(),
        });
        // Only observable effect is a warn log; the call itself must not fail.
        sink.mirror_activity(&sample_record()).await;
    }
}
