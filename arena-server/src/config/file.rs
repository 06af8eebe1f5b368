//! TOML file configuration structures.
//!
//! These structs directly map to the `arena-config.toml` file format.
//! Every section and every key is optional.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub matchmaking: MatchmakingConfig,
    pub rewards: RewardsConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Which transport carries the events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Durable, shared by every process pointed at the same database.
    #[default]
    Postgres,
    /// Process-local. Only useful when all services run in one process.
    /// Event ids seen by each consumer are remembered until the process
    /// exits, so memory grows with the number of distinct events.
    Memory,
}

/// Event bus and subscriber runtime section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub batch_size: u32,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub processing_deadline_ms: u64,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub publish_attempts: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Postgres,
            batch_size: 16,
            poll_interval_ms: 500,
            max_attempts: 5,
            processing_deadline_ms: 30_000,
            retry_base_ms: 1_000,
            retry_max_ms: 60_000,
            publish_attempts: 5,
        }
    }
}

/// Matchmaking queue section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    pub ticket_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            ticket_timeout_secs: 600,
            sweep_interval_secs: 30,
        }
    }
}

/// Reward table section. Reloaded on SIGHUP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub win: Decimal,
    pub draw: Decimal,
    pub loss: Decimal,
    pub per_mvp: Decimal,
    pub per_clutch: Decimal,
    pub storage_conflict_retries: u32,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            win: Decimal::from(10),
            draw: Decimal::from(5),
            loss: Decimal::ONE,
            per_mvp: Decimal::ONE,
            per_clutch: Decimal::ZERO,
            storage_conflict_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[bus]
backend = "memory"
batch_size = 4

[rewards]
win = 20
per_clutch = "2.5"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.bus.backend, BusBackend::Memory);
        assert_eq!(config.bus.batch_size, 4);
        // Untouched keys keep their defaults
        assert_eq!(config.bus.max_attempts, 5);
        assert_eq!(config.rewards.win, Decimal::from(20));
        assert_eq!(config.rewards.per_clutch, Decimal::new(25, 1));
        assert_eq!(config.rewards.draw, Decimal::from(5));
        assert_eq!(config.matchmaking.ticket_timeout_secs, 600);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.bus.backend, BusBackend::Postgres);
        assert_eq!(config.bus.processing_deadline_ms, 30_000);
        assert_eq!(config.rewards.storage_conflict_retries, 3);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let toml_str = r#"
[bus]
backend = "kafka"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
