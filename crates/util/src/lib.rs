pub mod config;

use std::path::PathBuf;

pub use config::{AppConfig, ConfigError, Environment, ProxyConfig};

/// Reads `.env` from the working directory or one of its parents into the
/// process environment, without overriding variables that are already set.
///
/// Returns the file that was applied; a missing `.env` is not an error.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
