//! Site Configuration Module
//!
//! Provides deployment configuration loaded from TOML files with environment
//! overrides for secrets and endpoints.
//!
//! ## Loading Order
//!
//! 1. `SITEWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `sitewatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Environment variables (optionally from `.env`) are applied on top.
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(SiteConfig::load());
//!
//! // In handlers:
//! let name = &config::get().project.name;
//! ```
//!
//! Library components never reach for the global; they take their section
//! (`RetrievalConfig`, `ScoringConfig`, ...) explicitly.

mod site_config;
pub mod defaults;

pub use site_config::*;

use std::sync::OnceLock;

/// Global site configuration, initialized once at startup.
static SITE_CONFIG: OnceLock<SiteConfig> = OnceLock::new();

/// Initialize the global site configuration.
///
/// Subsequent calls are ignored with a warning.
pub fn init(config: SiteConfig) {
    if SITE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global site configuration, falling back to defaults when
/// `init()` was never called (tests, embedded use).
pub fn get() -> &'static SiteConfig {
    SITE_CONFIG.get_or_init(SiteConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    SITE_CONFIG.get().is_some()
}
