//! Configuration management for Romdeck
//!
//! Handles the app configuration file, sync filter preferences, and the
//! built-in platform definition table. TOML-based config files.

mod filters;
mod platforms;

pub use filters::{RegionFilterMode, SyncFilterConfig};
pub use platforms::{PlatformDef, platform_def};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

/// Main Romdeck configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote library server URL (scheme optional, probed on connect)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Username used for the last login
    #[serde(default)]
    pub username: Option<String>,

    /// Device name reported on device registration
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Data directory (catalog database, downloads)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub filters: SyncFilterConfig,
}

fn default_device_name() -> String {
    "Romdeck".to_string()
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".romdeck"))
        .unwrap_or_else(|| PathBuf::from(".romdeck"))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            username: None,
            device_name: default_device_name(),
            data_dir: default_data_dir(),
            filters: SyncFilterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_data_dir().join(CONFIG_FILE);
        if path.exists() {
            return Self::load(&path);
        }

        // Return default config if no file exists
        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Save to the default configuration location
    pub fn save_default(&self) -> Result<(), ConfigError> {
        self.save(&self.data_dir.join(CONFIG_FILE))
    }

    /// Path of the catalog database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }
}
