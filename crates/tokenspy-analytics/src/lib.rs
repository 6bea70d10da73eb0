//! # tokenspy-analytics
//!
//! Session-health signals over an agent's usage history.
//!
//! [`SessionAnalyzer`] takes chronologically ordered [`SessionSample`]s,
//! infers where the current session began, and derives a [`SessionStatus`]
//! with rolling cost and cache figures plus a [`Recommendation`].

#![deny(unsafe_code)]

pub mod session;

pub use session::{
    DEFAULT_CHAR_LIMIT, DEFAULT_LOOKBACK_HOURS, Recommendation, SessionAnalyzer, SessionSample,
    SessionStatus,
};
