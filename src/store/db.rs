//! SQLite persistence for activities, wallet state, and run history
//!
//! Single connection behind a mutex: the orchestrator is the only writer and
//! runs one cycle at a time, so plain single-writer discipline is enough. No
//! lock is held between cycles, which keeps the database file safe to back up
//! with a plain copy.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::{
    ActivityRecord, ActivityStatus, Platform, PlatformStats, RunSummary, StateDelta, StatsView,
    WalletState,
};

/// State store over a single SQLite database file
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and if needed create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;

        info!("Opened state store: {}", path.display());
        Ok(store)
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Store(format!("connection lock poisoned: {}", e)))?;
        f(&conn)
    }

    fn init(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    wallet_id INTEGER NOT NULL,
                    wallet_address TEXT NOT NULL,
                    platform TEXT NOT NULL,
                    activity_type TEXT NOT NULL,
                    status TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    tx_reference TEXT,
                    details TEXT,
                    points_delta REAL NOT NULL DEFAULT 0,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS wallet_state (
                    wallet_id INTEGER NOT NULL,
                    platform TEXT NOT NULL,
                    last_activity TEXT,
                    tx_count INTEGER NOT NULL DEFAULT 0,
                    points REAL NOT NULL DEFAULT 0,
                    updated_at TEXT,
                    PRIMARY KEY (wallet_id, platform)
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS platform_stats (
                    platform TEXT PRIMARY KEY,
                    success_count INTEGER NOT NULL DEFAULT 0,
                    failure_count INTEGER NOT NULL DEFAULT 0,
                    last_run TEXT,
                    updated_at TEXT
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS scheduler_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    finished_at TEXT NOT NULL,
                    wallets_processed INTEGER NOT NULL DEFAULT 0,
                    activities_succeeded INTEGER NOT NULL DEFAULT 0,
                    activities_failed INTEGER NOT NULL DEFAULT 0,
                    error_summary TEXT,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;

            Ok(())
        })
    }

    /// Append one activity record. Insert-only, never overwrites.
    pub fn append_activity(&self, record: &ActivityRecord) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO activity_log
                    (wallet_id, wallet_address, platform, activity_type, status,
                     timestamp, tx_reference, details, points_delta)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.wallet_id,
                    record.wallet_address,
                    record.platform.as_str(),
                    record.activity_type,
                    record.status.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.tx_reference,
                    record.details,
                    record.points_delta,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Apply the counter update for exactly one activity attempt.
    pub fn update_wallet_state(
        &self,
        wallet_id: u32,
        platform: Platform,
        delta: &StateDelta,
    ) -> Result<()> {
        let tx_increment: i64 = if delta.succeeded { 1 } else { 0 };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wallet_state
                    (wallet_id, platform, last_activity, tx_count, points, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(wallet_id, platform) DO UPDATE SET
                    last_activity = excluded.last_activity,
                    tx_count = tx_count + excluded.tx_count,
                    points = points + excluded.points,
                    updated_at = excluded.updated_at",
                params![
                    wallet_id,
                    platform.as_str(),
                    delta.at.to_rfc3339(),
                    tx_increment,
                    delta.points,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Bump per-platform success/failure counters.
    pub fn update_platform_stats(
        &self,
        platform: Platform,
        succeeded: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let (success, failure): (i64, i64) = if succeeded { (1, 0) } else { (0, 1) };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO platform_stats
                    (platform, success_count, failure_count, last_run, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(platform) DO UPDATE SET
                    success_count = success_count + excluded.success_count,
                    failure_count = failure_count + excluded.failure_count,
                    last_run = excluded.last_run,
                    updated_at = excluded.updated_at",
                params![
                    platform.as_str(),
                    success,
                    failure,
                    at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Record one scheduler run. Written even for partial cycles.
    pub fn record_run_summary(&self, summary: &RunSummary) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scheduler_runs
                    (run_id, started_at, finished_at, wallets_processed,
                     activities_succeeded, activities_failed, error_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    summary.run_id.to_string(),
                    summary.started_at.to_rfc3339(),
                    summary.finished_at.to_rfc3339(),
                    summary.wallets_processed as i64,
                    summary.activities_succeeded as i64,
                    summary.activities_failed as i64,
                    summary.error_summary,
                ],
            )?;
            Ok(())
        })
    }

    /// Live counters for one wallet/platform pair
    pub fn wallet_state(&self, wallet_id: u32, platform: Platform) -> Result<Option<WalletState>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT last_activity, tx_count, points FROM wallet_state
                     WHERE wallet_id = ?1 AND platform = ?2",
                    params![wallet_id, platform.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, f64>(2)?,
                        ))
                    },
                )
                .optional()?;

            match row {
                Some((last, tx_count, points)) => Ok(Some(WalletState {
                    wallet_id,
                    platform,
                    last_activity: last.as_deref().map(parse_ts).transpose()?,
                    tx_count: tx_count as u64,
                    points,
                })),
                None => Ok(None),
            }
        })
    }

    /// Recompute wallet state by folding the activity log in timestamp order.
    ///
    /// This is the consistency check: the result must equal the live
    /// `wallet_state` row for any sequence of recorded attempts.
    pub fn replay_wallet_state(&self, wallet_id: u32, platform: Platform) -> Result<WalletState> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, timestamp, points_delta FROM activity_log
                 WHERE wallet_id = ?1 AND platform = ?2
                 ORDER BY timestamp, id",
            )?;
            let rows = stmt.query_map(params![wallet_id, platform.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?;

            let mut state = WalletState::empty(wallet_id, platform);
            for row in rows {
                let (status, timestamp, points_delta) = row?;
                let status: ActivityStatus = status
                    .parse()
                    .map_err(|e: String| Error::Store(e))?;
                if status == ActivityStatus::Success {
                    state.tx_count += 1;
                }
                state.points += points_delta;
                state.last_activity = Some(parse_ts(&timestamp)?);
            }
            Ok(state)
        })
    }

    /// Newest-first page of the activity log
    pub fn recent_activities(&self, limit: u32) -> Result<Vec<ActivityRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT wallet_id, wallet_address, platform, activity_type, status,
                        timestamp, tx_reference, details, points_delta
                 FROM activity_log ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let platform: String = row.get(2)?;
                let status: String = row.get(4)?;
                let timestamp: String = row.get(5)?;
                Ok(ActivityRecord {
                    wallet_id: row.get(0)?,
                    wallet_address: row.get(1)?,
                    platform: platform
                        .parse()
                        .map_err(|e: String| conversion_error(2, e))?,
                    activity_type: row.get(3)?,
                    status: status.parse().map_err(|e: String| conversion_error(4, e))?,
                    timestamp: parse_ts(&timestamp)
                        .map_err(|e| conversion_error(5, e.to_string()))?,
                    tx_reference: row.get(6)?,
                    details: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    points_delta: row.get(8)?,
                })
            })?;

            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
        })
    }

    /// Per-platform counters
    pub fn platform_stats(&self) -> Result<Vec<PlatformStats>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT platform, success_count, failure_count, last_run
                 FROM platform_stats ORDER BY platform",
            )?;
            let rows = stmt.query_map([], |row| {
                let platform: String = row.get(0)?;
                let last_run: Option<String> = row.get(3)?;
                Ok(PlatformStats {
                    platform: platform
                        .parse()
                        .map_err(|e: String| conversion_error(0, e))?,
                    success_count: row.get::<_, i64>(1)? as u64,
                    failure_count: row.get::<_, i64>(2)? as u64,
                    last_run: last_run
                        .as_deref()
                        .map(|s| parse_ts(s).map_err(|e| conversion_error(3, e.to_string())))
                        .transpose()?,
                })
            })?;

            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
        })
    }

    /// Newest-first scheduler run history
    pub fn recent_runs(&self, limit: u32) -> Result<Vec<RunSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT run_id, started_at, finished_at, wallets_processed,
                        activities_succeeded, activities_failed, error_summary
                 FROM scheduler_runs ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let run_id: String = row.get(0)?;
                let started_at: String = row.get(1)?;
                let finished_at: String = row.get(2)?;
                Ok(RunSummary {
                    run_id: Uuid::parse_str(&run_id)
                        .map_err(|e| conversion_error(0, e.to_string()))?,
                    started_at: parse_ts(&started_at)
                        .map_err(|e| conversion_error(1, e.to_string()))?,
                    finished_at: parse_ts(&finished_at)
                        .map_err(|e| conversion_error(2, e.to_string()))?,
                    wallets_processed: row.get::<_, i64>(3)? as u64,
                    activities_succeeded: row.get::<_, i64>(4)? as u64,
                    activities_failed: row.get::<_, i64>(5)? as u64,
                    error_summary: row.get(6)?,
                })
            })?;

            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
        })
    }

    pub fn activity_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM activity_log", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    pub fn run_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM scheduler_runs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Read-only aggregate view for the stats command
    pub fn query_stats(&self) -> Result<StatsView> {
        let total_activities = self.activity_count()?;
        let wallets_seen = self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT wallet_id) FROM activity_log",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })?;
        let platforms = self.platform_stats()?;
        let recent_runs = self.recent_runs(5)?;

        Ok(StatsView {
            total_activities,
            wallets_seen,
            platforms,
            recent_runs,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("invalid stored timestamp {}: {}", s, e)))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> Store {
        Store::open(&dir.path().join("farmer.db")).unwrap()
    }

    fn record(
        wallet_id: u32,
        platform: Platform,
        status: ActivityStatus,
        points_delta: f64,
    ) -> ActivityRecord {
        ActivityRecord {
            wallet_id,
            wallet_address: format!("0xwallet{}", wallet_id),
            platform,
            activity_type: "chain_interaction".to_string(),
            status,
            timestamp: Utc::now(),
            tx_reference: None,
            details: String::new(),
            points_delta,
        }
    }

    fn apply(store: &Store, rec: &ActivityRecord) {
        store.append_activity(rec).unwrap();
        store
            .update_wallet_state(
                rec.wallet_id,
                rec.platform,
                &StateDelta {
                    succeeded: rec.status == ActivityStatus::Success,
                    points: rec.points_delta,
                    at: rec.timestamp,
                },
            )
            .unwrap();
        store
            .update_platform_stats(
                rec.platform,
                rec.status == ActivityStatus::Success,
                rec.timestamp,
            )
            .unwrap();
    }

    #[test]
    fn append_is_insert_only() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let first = store
            .append_activity(&record(0, Platform::Dex, ActivityStatus::Success, 1.0))
            .unwrap();
        let second = store
            .append_activity(&record(0, Platform::Dex, ActivityStatus::Success, 1.0))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(store.activity_count().unwrap(), 2);
    }

    #[test]
    fn wallet_state_tracks_one_attempt_per_call() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        apply(&store, &record(1, Platform::Dex, ActivityStatus::Success, 2.5));
        apply(&store, &record(1, Platform::Dex, ActivityStatus::Failed, 0.0));
        apply(&store, &record(1, Platform::Dex, ActivityStatus::Success, 1.5));

        let state = store.wallet_state(1, Platform::Dex).unwrap().unwrap();
        assert_eq!(state.tx_count, 2);
        assert!((state.points - 4.0).abs() < f64::EPSILON);
        assert!(state.last_activity.is_some());
    }

    #[test]
    fn replay_matches_live_state_for_mixed_outcomes() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let sequence = [
            (ActivityStatus::Success, 3.0),
            (ActivityStatus::Failed, 0.0),
            (ActivityStatus::Success, 0.5),
            (ActivityStatus::Failed, 0.0),
            (ActivityStatus::Success, 2.0),
        ];
        for (status, points) in sequence {
            apply(&store, &record(7, Platform::TestChain, status, points));
        }

        let live = store.wallet_state(7, Platform::TestChain).unwrap().unwrap();
        let replayed = store.replay_wallet_state(7, Platform::TestChain).unwrap();

        assert_eq!(replayed.tx_count, live.tx_count);
        assert!((replayed.points - live.points).abs() < f64::EPSILON);
        assert_eq!(replayed.last_activity, live.last_activity);
    }

    #[test]
    fn replay_of_untouched_pair_is_empty() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let state = store.replay_wallet_state(9, Platform::Market).unwrap();
        assert_eq!(state, WalletState::empty(9, Platform::Market));
    }

    #[test]
    fn platform_counters_split_success_and_failure() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        apply(&store, &record(0, Platform::Market, ActivityStatus::Success, 0.0));
        apply(&store, &record(1, Platform::Market, ActivityStatus::Failed, 0.0));
        apply(&store, &record(2, Platform::Market, ActivityStatus::Success, 0.0));

        let stats = store.platform_stats().unwrap();
        let market = stats
            .iter()
            .find(|s| s.platform == Platform::Market)
            .unwrap();
        assert_eq!(market.success_count, 2);
        assert_eq!(market.failure_count, 1);
        assert!(market.last_run.is_some());
    }

    #[test]
    fn run_summary_round_trips() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            wallets_processed: 3,
            activities_succeeded: 9,
            activities_failed: 0,
            error_summary: None,
        };
        store.record_run_summary(&summary).unwrap();

        let runs = store.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, summary.run_id);
        assert_eq!(runs[0].wallets_processed, 3);
        assert_eq!(runs[0].activities_succeeded, 9);
        assert_eq!(runs[0].error_summary, None);
    }

    #[test]
    fn recent_activities_are_newest_first() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        for i in 0..3u32 {
            let mut rec = record(i, Platform::Dex, ActivityStatus::Success, 0.0);
            rec.activity_type = format!("activity_{}", i);
            store.append_activity(&rec).unwrap();
        }

        let recent = store.recent_activities(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].activity_type, "activity_2");
        assert_eq!(recent[1].activity_type, "activity_1");
    }

    #[test]
    fn stats_view_aggregates_counters() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        apply(&store, &record(0, Platform::Dex, ActivityStatus::Success, 1.0));
        apply(&store, &record(1, Platform::Market, ActivityStatus::Failed, 0.0));

        let stats = store.query_stats().unwrap();
        assert_eq!(stats.total_activities, 2);
        assert_eq!(stats.wallets_seen, 2);
        assert_eq!(stats.platforms.len(), 2);
    }
}
