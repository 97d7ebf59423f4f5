use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Static lookup data loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub public_suffix_list: String,
    pub top_level_domains: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocklistConfig {
    /// Optional standalone blocklist file, watched for changes
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config = toml::from_str(content)?;
        Ok(config)
    }
}
