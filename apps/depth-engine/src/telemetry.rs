//! Tracing Setup
//!
//! Console-structured logging via `tracing-subscriber`.
//!
//! # Configuration
//!
//! - `RUST_LOG`: standard `EnvFilter` directives (default: `info`)
//! - `DEPTH_ENV`: set to `development` for ANSI colors and bare targets

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init() {
    let is_development = std::env::var("DEPTH_ENV")
        .map(|v| v == "development")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(!is_development)
        .with_ansi(is_development)
        .init();
}
