//! GridGate Configuration Module
//! Handles loading and validating gridgate.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-base member quota applied when adding members.
    #[serde(default = "default_member_limit")]
    pub per_base_member_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_base_member_limit: default_member_limit(),
        }
    }
}

fn default_port() -> u16 {
    47810
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_member_limit() -> usize {
    crate::engine::members::DEFAULT_MEMBER_LIMIT
}

impl Config {
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join("gridgate.config.json");
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let config_path = dir.join("gridgate.config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            limits: LimitsConfig::default(),
        }
    }
}
