//! Site Configuration Module
//!
//! Storage location, fitting policy, prediction formatting and import
//! behaviour, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `BLAST_PPV_CONFIG` environment variable (path to TOML file)
//! 2. `blast_ppv.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(SiteConfig::load());
//!
//! // Anywhere in the codebase:
//! let min_points = config::get().fitting.min_usable_points;
//! ```

mod site_config;
pub mod defaults;
pub mod validation;

pub use site_config::*;

use std::sync::OnceLock;

/// Global site configuration, initialized once at startup.
static SITE_CONFIG: OnceLock<SiteConfig> = OnceLock::new();

/// Initialize the global site configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: SiteConfig) {
    if SITE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global site configuration.
///
/// Panics if `init()` has not been called. A missing config is a startup
/// bug, not a recoverable condition.
pub fn get() -> &'static SiteConfig {
    SITE_CONFIG
        .get()
        .expect("config::get() called before config::init(), this is a startup bug")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    SITE_CONFIG.get().is_some()
}
