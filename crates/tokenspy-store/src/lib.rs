//! # tokenspy-store
//!
//! Persistence for usage records.
//!
//! - **Contract**: [`UsageStore`] (`log_usage`, `query_usage`,
//!   `query_summary`, `query_session_status`, `query_recent_events`)
//! - **Backend**: [`SqliteUsageStore`] over an `r2d2` pool in WAL mode
//! - **Schema**: versioned migrations tracked in `schema_version`
//!
//! Session status is computed by `tokenspy-analytics` over the agent's
//! samples in the lookback horizon.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::ConnectionConfig;
pub use sqlite::row_types::{AgentSummary, RecentEvent, StoredUsage};
pub use store::{SqliteUsageStore, UsageStore};
