//! Lazily built outbound HTTP client.

use std::time::Duration;

use parking_lot::Mutex;
use tokenspy_settings::HttpSettings;
use tracing::debug;

use crate::provider::ProviderResult;

/// User agent sent upstream.
pub const USER_AGENT: &str = "tokenspy/0.1";

/// One `reqwest::Client` per provider instance, built on first use.
///
/// `reqwest::Client` is an `Arc` internally, so handing out clones shares
/// the connection pool.
#[derive(Debug, Default)]
pub struct CachedClient {
    slot: Mutex<Option<reqwest::Client>>,
}

impl CachedClient {
    /// Return the cached client, building it from `http` if needed.
    pub fn get_or_build(&self, http: &HttpSettings) -> ProviderResult<reqwest::Client> {
        let mut slot = self.slot.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = build_client(http)?;
        debug!(
            connect_timeout_ms = http.connect_timeout_ms,
            read_timeout_ms = http.read_timeout_ms,
            "built upstream HTTP client"
        );
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Whether a client has been built.
    pub fn is_built(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Drop the cached client; the next call rebuilds it.
    pub fn reset(&self) {
        *self.slot.lock() = None;
    }
}

/// Build a client with the given policy.
pub fn build_client(http: &HttpSettings) -> ProviderResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
        .read_timeout(Duration::from_millis(http.read_timeout_ms))
        .pool_idle_timeout(Duration::from_millis(http.pool_idle_timeout_ms))
        .pool_max_idle_per_host(http.max_idle_per_host as usize)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
