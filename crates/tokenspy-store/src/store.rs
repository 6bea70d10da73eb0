//! The persistence contract and its `SQLite` implementation.

use std::path::Path;

use tokenspy_analytics::{DEFAULT_LOOKBACK_HOURS, SessionAnalyzer, SessionStatus};
use tokenspy_core::UsageRecord;
use tokenspy_settings::TokenSpySettings;
use tracing::{debug, instrument};

use crate::errors::Result;
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::UsageRepo;
use crate::sqlite::repositories::usage::{cutoff, now_timestamp};
use crate::sqlite::row_types::{AgentSummary, RecentEvent, StoredUsage};

/// Where usage records go and how they are read back.
///
/// Writes may block on I/O. Failures surface to the caller unchanged; no
/// operation retries.
pub trait UsageStore: Send + Sync {
    /// Persist one record, stamping it with the current time. Returns its id.
    fn log_usage(&self, record: &UsageRecord) -> Result<i64>;

    /// Records from the last `hours`, newest first, at most `limit`.
    fn query_usage(&self, agent: Option<&str>, hours: u32, limit: u32)
    -> Result<Vec<StoredUsage>>;

    /// Per-agent aggregates over the last `hours`.
    fn query_summary(&self, hours: u32) -> Result<Vec<AgentSummary>>;

    /// Session health for `agent` against threshold `char_limit`.
    fn query_session_status(&self, agent: &str, char_limit: u64) -> Result<SessionStatus>;

    /// Latest records for a live feed, optionally only those after `after_id`.
    fn query_recent_events(&self, limit: u32, after_id: Option<i64>) -> Result<Vec<RecentEvent>>;
}

/// [`UsageStore`] over a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteUsageStore {
    pool: ConnectionPool,
    lookback_hours: u32,
}

impl std::fmt::Debug for SqliteUsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUsageStore")
            .field("max_connections", &self.pool.max_size())
            .field("lookback_hours", &self.lookback_hours)
            .finish()
    }
}

impl SqliteUsageStore {
    /// Wrap an existing pool and bring its schema up to date.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            debug!(applied, "usage schema ready");
        }
        Ok(Self {
            pool,
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
        })
    }

    /// Open (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<Self> {
        Self::new(connection::new_file(path, config)?)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::new(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Open the database named by `settings`, with its pool and lookback
    /// configuration.
    pub fn from_settings(settings: &TokenSpySettings) -> Result<Self> {
        let store = Self::open(
            &settings.storage.db_path,
            &ConnectionConfig::from(&settings.storage),
        )?;
        Ok(store.with_lookback_hours(settings.session.lookback_hours))
    }

    /// Set how far back session-status queries look.
    #[must_use]
    pub fn with_lookback_hours(mut self, hours: u32) -> Self {
        self.lookback_hours = hours;
        self
    }

    /// Session-status lookback in hours.
    pub fn lookback_hours(&self) -> u32 {
        self.lookback_hours
    }

    /// Total stored records.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        UsageRepo::count(&conn)
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl UsageStore for SqliteUsageStore {
    #[instrument(skip_all, fields(agent = %record.agent, model = %record.model))]
    fn log_usage(&self, record: &UsageRecord) -> Result<i64> {
        let conn = self.conn()?;
        let id = UsageRepo::insert(&conn, record, &now_timestamp())?;
        debug!(
            id,
            input_tokens = record.usage.input_tokens,
            output_tokens = record.usage.output_tokens,
            cost = record.estimated_cost_usd,
            "usage logged"
        );
        Ok(id)
    }

    fn query_usage(
        &self,
        agent: Option<&str>,
        hours: u32,
        limit: u32,
    ) -> Result<Vec<StoredUsage>> {
        let conn = self.conn()?;
        UsageRepo::list(&conn, agent, &cutoff(hours), limit)
    }

    fn query_summary(&self, hours: u32) -> Result<Vec<AgentSummary>> {
        let conn = self.conn()?;
        UsageRepo::summary(&conn, &cutoff(hours))
    }

    fn query_session_status(&self, agent: &str, char_limit: u64) -> Result<SessionStatus> {
        let conn = self.conn()?;
        let samples = UsageRepo::session_samples(&conn, agent, &cutoff(self.lookback_hours))?;
        Ok(SessionAnalyzer::new(char_limit).analyze(agent, &samples))
    }

    fn query_recent_events(&self, limit: u32, after_id: Option<i64>) -> Result<Vec<RecentEvent>> {
        let conn = self.conn()?;
        UsageRepo::recent(&conn, limit, after_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
