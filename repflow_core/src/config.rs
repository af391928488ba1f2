//! Configuration file support for Repflow.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/repflow/config.toml`.

use crate::{Error, LoadUnit, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub units: UnitsConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn database_path(&self) -> PathBuf {
        database_path(&self.data_dir)
    }
}

/// Database file inside a data directory
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("repflow.json")
}

/// Live session behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds before the end of a rest at which the near-expiry alert fires
    #[serde(default = "default_rest_alert_seconds")]
    pub rest_alert_seconds: u32,

    /// Rest used when a prescribed exercise has none
    #[serde(default)]
    pub default_rest_seconds: Option<u32>,

    /// How often the terminal runner ticks the timers
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Schedule an external alert for the end of each rest
    #[serde(default = "default_notify_rest")]
    pub notify_rest: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rest_alert_seconds: default_rest_alert_seconds(),
            default_rest_seconds: None,
            tick_millis: default_tick_millis(),
            notify_rest: default_notify_rest(),
        }
    }
}

/// Units assumed for bare numbers typed at the prompt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitsConfig {
    #[serde(default = "default_load_unit")]
    pub load: LoadUnit,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            load: default_load_unit(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("repflow")
}

fn default_rest_alert_seconds() -> u32 {
    crate::rest::DEFAULT_ALERT_SECONDS
}

fn default_tick_millis() -> u64 {
    250
}

fn default_notify_rest() -> bool {
    true
}

fn default_load_unit() -> LoadUnit {
    LoadUnit::Kg
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.tick_millis == 0 {
            return Err(Error::Config("session.tick_millis must be positive".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("repflow").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
