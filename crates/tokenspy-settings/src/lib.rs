//! # tokenspy-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TokenSpySettings::default()`]
//! 2. **User file**: `~/.tokenspy/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TOKENSPY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<TokenSpySettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.tokenspy/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static TokenSpySettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns `Err(settings)` if they were already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TokenSpySettings) -> std::result::Result<(), TokenSpySettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
