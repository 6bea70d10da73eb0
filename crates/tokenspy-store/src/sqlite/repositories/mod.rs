//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter, so every operation is a function of (connection, input).

pub mod usage;

pub use usage::UsageRepo;
