//! Application configuration.
//!
//! A small optional `config.toml` in the platform config directory. A
//! missing file is not an error; every field has a default.

use crate::error::{Result, TempoError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time-to-live for the derived statistics cache.
pub const DEFAULT_STATS_TTL_SECS: u64 = 30;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TempoConfig {
    /// Overrides the session data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Overrides the statistics cache TTL, in seconds
    #[serde(default)]
    pub stats_ttl_secs: Option<u64>,
}

impl TempoConfig {
    /// Loads the configuration from the default platform location.
    ///
    /// Returns defaults when no config file exists.
    pub fn load() -> Result<Self> {
        match Self::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads the configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// The platform config file location (`<config dir>/tempo/config.toml`).
    pub fn config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tempo").join("config.toml"))
    }

    /// Resolves the session data directory.
    ///
    /// Uses the configured override when present, otherwise the platform
    /// data directory plus `tempo`.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("tempo"))
            .ok_or_else(|| TempoError::config("cannot determine platform data directory"))
    }

    /// The statistics cache TTL.
    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs.unwrap_or(DEFAULT_STATS_TTL_SECS))
    }
}
