//! Configuration management

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use whisper_core::LedgerConfig;
use whisper_crypto::envelope::ENVELOPE_OVERHEAD;
use whisper_proto::limits::{DEFAULT_MAX_PAYLOAD_LEN, MAX_CONFIGURABLE_PAYLOAD_LEN};

/// Smallest payload limit that still fits a one-byte message.
const MIN_PAYLOAD_LEN: usize = ENVELOPE_OVERHEAD + 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// SQLite database file. Records are kept in memory when unset.
    pub database_path: Option<PathBuf>,
    pub max_payload_len: usize,
    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8899)),
            database_path: None,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::load`] with a custom variable lookup.
    pub fn load_with(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = var("WHISPER_NODE_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }

        if let Some(path) = var("WHISPER_NODE_DATABASE_PATH") {
            config.database_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }

        if let Some(len) = var("WHISPER_NODE_MAX_PAYLOAD_LEN") {
            config.max_payload_len = len
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid max_payload_len: {}", e)))?;
        }

        if let Some(filter) = var("WHISPER_NODE_LOG_FILTER") {
            config.log_filter = filter;
        }

        // TOML file (if specified) overrides the environment.
        if let Some(config_path) = var("WHISPER_NODE_CONFIG") {
            let content = std::fs::read_to_string(&config_path)?;
            config.apply_toml(&content)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Apply keys present in a TOML document.
    pub fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let toml_config: toml::Value = toml::from_str(content)?;

        if let Some(addr) = toml_config.get("listen_addr").and_then(|v| v.as_str()) {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr in TOML: {}", e)))?;
        }

        if let Some(path) = toml_config.get("database_path").and_then(|v| v.as_str()) {
            self.database_path = Some(PathBuf::from(path));
        }

        if let Some(len) = toml_config.get("max_payload_len").and_then(|v| v.as_integer()) {
            self.max_payload_len = usize::try_from(len)
                .map_err(|_| ConfigError::Invalid(format!("Invalid max_payload_len in TOML: {}", len)))?;
        }

        if let Some(filter) = toml_config.get("log_filter").and_then(|v| v.as_str()) {
            self.log_filter = filter.to_string();
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The upper bound keeps a full signed submission under the request
        // body limit.
        if !(MIN_PAYLOAD_LEN..=MAX_CONFIGURABLE_PAYLOAD_LEN).contains(&self.max_payload_len) {
            return Err(ConfigError::Invalid(format!(
                "max_payload_len must be between {} and {}",
                MIN_PAYLOAD_LEN, MAX_CONFIGURABLE_PAYLOAD_LEN
            )));
        }

        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            max_payload_len: self.max_payload_len,
        }
    }
}
