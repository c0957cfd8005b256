//! Runtime configuration loaded from a TOML file
//!
//! A missing file falls back to defaults so the simulator runs out of the box.
//! The file is looked up at `$FLEETSIM_CONFIG`, else `~/.config/fleetsim/config.toml`.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, Level};

const CONFIG_ENV: &str = "FLEETSIM_CONFIG";
const CONFIG_DIR: &str = ".config/fleetsim";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid broker address {0}")]
    InvalidAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub device: DeviceConfig,
    pub orchestrator: OrchestratorConfig,
    pub log: LogConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Size of the per-connection read buffer in bytes
    pub read_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6162,
            read_buffer: 1024,
        }
    }
}

impl BrokerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Emission period of passive devices
    pub passive_interval_ms: u64,
    pub mailbox_capacity: usize,
    /// Open a TCP link to the broker on start
    pub connect_to_broker: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            passive_interval_ms: 5000,
            mailbox_capacity: 16,
            connect_to_broker: true,
        }
    }
}

impl DeviceConfig {
    pub fn passive_interval(&self) -> Duration {
        Duration::from_millis(self.passive_interval_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Capacity of the queue shared by all units
    pub inbound_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

impl Config {
    /// Reads the config file at `path`, or `None` when it does not exist
    pub async fn load_from(path: &Path) -> Result<Option<Self>> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?
        {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        Self::from_toml_str(&content).map(Some)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))?;
        config.validate()?;
        debug!("Parsed config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.listen_addr()?;
        if self.broker.read_buffer == 0 {
            return Err(ConfigError::ZeroValue("broker.read_buffer"));
        }
        if self.device.passive_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("device.passive_interval_ms"));
        }
        if self.device.mailbox_capacity == 0 {
            return Err(ConfigError::ZeroValue("device.mailbox_capacity"));
        }
        if self.orchestrator.inbound_capacity == 0 {
            return Err(ConfigError::ZeroValue("orchestrator.inbound_capacity"));
        }
        Ok(())
    }
}

/// `$FLEETSIM_CONFIG`, or the file under the home config directory
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
