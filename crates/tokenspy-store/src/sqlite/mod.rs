//! `SQLite` backend for the usage store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and busy timeout applied to
//!   every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time and
//!   run transactionally.
//! - **[`row_types`]**: row shapes returned by queries.
//! - **[`repositories`]**: stateless repositories over `&Connection`.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, journal_mode, new_file, new_in_memory,
};
pub use migrations::{current_version, latest_version, run_migrations};
