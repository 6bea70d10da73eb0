//! # tokenspy-core
//!
//! Shared vocabulary for the tokenspy crates.
//!
//! - **Usage model**: [`UsageFragment`] (partial, mergeable), [`TokenUsage`]
//!   (resolved), [`RequestMetrics`] (request-side sizes), [`UsageRecord`]
//!   (one persisted exchange)
//! - **Workspace sections**: the fixed list of named system-prompt sections
//!   tracked for size attribution
//! - **Text helpers**: character counting and log-safe truncation
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod logging;
pub mod text;
pub mod usage;

pub use usage::{
    RequestMetrics, TokenUsage, UsageFragment, UsageRecord, WorkspaceChars, WorkspaceSection,
};
