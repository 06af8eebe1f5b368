//! Configuration module for arena-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{BusSettings, RewardSettings, ServerConfig};
use arena_core::config::MatchmakingConfig;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub bus: BusSettings,
    pub matchmaking: MatchmakingConfig,
    pub rewards: RewardSettings,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// A missing file is not an error: every section has defaults.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str::<FileConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(&file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let bus = &config.bus;
    if bus.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "bus.batch_size must be at least 1".to_string(),
        ));
    }
    if bus.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "bus.max_attempts must be at least 1".to_string(),
        ));
    }
    if bus.publish_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "bus.publish_attempts must be at least 1".to_string(),
        ));
    }
    if bus.processing_deadline_ms == 0 {
        return Err(ConfigError::ValidationError(
            "bus.processing_deadline_ms must be positive".to_string(),
        ));
    }
    if bus.retry_base_ms > bus.retry_max_ms {
        return Err(ConfigError::ValidationError(format!(
            "bus.retry_base_ms ({}) exceeds bus.retry_max_ms ({})",
            bus.retry_base_ms, bus.retry_max_ms
        )));
    }
    if config.matchmaking.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "matchmaking.sweep_interval_secs must be positive".to_string(),
        ));
    }

    let rewards = &config.rewards;
    for (name, value) in [
        ("win", rewards.win),
        ("draw", rewards.draw),
        ("loss", rewards.loss),
        ("per_mvp", rewards.per_mvp),
        ("per_clutch", rewards.per_clutch),
    ] {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "rewards.{name} must not be negative, got {value}"
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: &FileConfig) -> LoadedConfig {
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        bus: BusSettings::from(&file_config.bus),
        matchmaking: MatchmakingConfig::from(&file_config.matchmaking),
        rewards: RewardSettings::from(&file_config.rewards),
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
