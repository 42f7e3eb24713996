// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub assets: AssetsConfig,
    pub supervisor: SupervisorConfig,
    pub relay: RelayConfig,
    pub features: FeaturesConfig,
}

impl Config {
    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            bail!("server.bind_address must not be empty");
        }
        self.supervisor.shutdown_grace()?;
        if self.relay.room_capacity == 0 {
            bail!("relay.room_capacity must be at least 1");
        }
        if self.relay.max_message_bytes == 0 {
            bail!("relay.max_message_bytes must be at least 1");
        }
        if self.relay.cleanup_interval_secs == 0 {
            bail!("relay.cleanup_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8000")
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Bundled frontend location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory holding index.html and assets/. Resolved next to the
    /// executable when unset.
    pub static_dir: Option<PathBuf>,
}

/// Background service supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long shutdown waits for the service before aborting it
    pub shutdown_grace_secs: f64,
}

impl SupervisorConfig {
    /// Grace period as a `Duration`; fails for values it cannot represent
    pub fn shutdown_grace(&self) -> Result<Duration> {
        let secs = self.shutdown_grace_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(grace) if !grace.is_zero() => Ok(grace),
            _ => bail!(
                "supervisor.shutdown_grace_secs must be a positive number of seconds (got {})",
                secs
            ),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5.0,
        }
    }
}

/// Document relay tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Frames buffered per room before slow peers start lagging
    pub room_capacity: usize,
    /// Largest frame a peer may publish
    pub max_message_bytes: usize,
    /// Drop rooms nobody is subscribed to
    pub auto_clean_rooms: bool,
    pub cleanup_interval_secs: u64,
}

impl RelayConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_capacity: 256,
            max_message_bytes: 16 * 1024 * 1024,
            auto_clean_rooms: true,
            cleanup_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Promote the default log level to debug
    pub debug_logging: bool,
}
