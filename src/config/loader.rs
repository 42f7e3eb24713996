// Configuration loader
// Loads ~/.syncdock/config.toml (or an explicit path), then applies
// environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;
use crate::errors::config_parse_error;

const BIND_ENV: &str = "SYNCDOCK_BIND";
const STATIC_DIR_ENV: &str = "SYNCDOCK_STATIC_DIR";

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".syncdock").join("config.toml"))
}

/// Load configuration from `path`, or the default location when `None`.
///
/// A missing file is not an error: defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match path {
        Some(path) if path.exists() => load_config_from(&path)?,
        Some(path) => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Parse a config file without applying overrides
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!(config_parse_error(&path.display().to_string(), e)))
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup(BIND_ENV).filter(|v| !v.is_empty()) {
        config.server.bind_address = bind;
    }
    if let Some(dir) = lookup(STATIC_DIR_ENV).filter(|v| !v.is_empty()) {
        config.assets.static_dir = Some(PathBuf::from(dir));
    }
}
