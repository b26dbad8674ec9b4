//! tagrelay CLI Configuration Management
//!
//! Configuration is layered with the priority order
//! CLI args > env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tagrelay_core::TrackerConfig;

use crate::error::{CliError, Result};

/// Environment variable overriding the measurement id
pub const MEASUREMENT_ID_ENV: &str = "TAGRELAY_MEASUREMENT_ID";

/// File name of the client id store inside the data directory
pub const CLIENT_STORE_FILE: &str = "client_store.json";

/// Complete configuration for the tagrelay CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tracker settings shared with the browser build
    pub tracker: TrackerConfig,

    /// Where the client id store lives; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build the effective configuration: defaults, then the optional file,
    /// then environment lookups, then command line values
    pub fn load_layered<F>(
        config_path: Option<&str>,
        env: F,
        measurement_id: Option<String>,
        data_dir: Option<String>,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path);
                Self::load_from_file(path)
                    .with_context(|| format!("Failed to load configuration from {}", path))?
            }
            None => {
                tracing::info!("Using default configuration");
                Self::default()
            }
        };
        config.apply_env_from(env);
        config.apply_overrides(measurement_id, data_dir);
        config
            .tracker
            .validate()
            .context("Invalid tracker configuration")?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.tracker.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(MEASUREMENT_ID_ENV) {
            self.tracker.measurement_id = Some(id);
        }
    }

    /// Apply command line overrides
    pub fn apply_overrides(&mut self, measurement_id: Option<String>, data_dir: Option<String>) {
        if let Some(id) = measurement_id {
            self.tracker.measurement_id = Some(id);
        }
        if let Some(dir) = data_dir {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir().map(|dir| dir.join("tagrelay")).ok_or_else(|| {
            CliError::Config("No data directory available on this platform".to_string())
        })
    }

    pub fn client_store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(CLIENT_STORE_FILE))
    }
}
