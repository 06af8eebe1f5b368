//! Runtime configuration built from the file sections.
//!
//! The processors in `arena-core` only see these validated values.

use crate::config::file::{
    BusBackend, BusConfig, MatchmakingConfig as FileMatchmakingConfig, RewardsConfig,
};
use arena_core::config::{MatchmakingConfig, RewardTable};
use arena_core::events::SubscriberConfig;
use arena_core::utils::backoff::{Backoff, RetryPolicy};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Copy)]
pub struct BusSettings {
    pub backend: BusBackend,
    pub subscriber: SubscriberConfig,
    /// Producer-side retry for `BrokerUnavailable`.
    pub publish_policy: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct RewardSettings {
    pub table: RewardTable,
    /// Per-player budget for storage conflicts during settlement.
    pub conflict_policy: RetryPolicy,
}

impl From<&BusConfig> for BusSettings {
    fn from(bus: &BusConfig) -> Self {
        let retry = Backoff::new(
            Duration::from_millis(bus.retry_base_ms),
            Duration::from_millis(bus.retry_max_ms),
        );
        Self {
            backend: bus.backend,
            subscriber: SubscriberConfig {
                batch_size: bus.batch_size,
                poll_interval: Duration::from_millis(bus.poll_interval_ms),
                max_attempts: bus.max_attempts,
                processing_deadline: Duration::from_millis(bus.processing_deadline_ms),
                retry,
            },
            publish_policy: RetryPolicy::new(bus.publish_attempts, retry),
        }
    }
}

impl From<&FileMatchmakingConfig> for MatchmakingConfig {
    fn from(matchmaking: &FileMatchmakingConfig) -> Self {
        Self {
            ticket_timeout: Duration::from_secs(matchmaking.ticket_timeout_secs),
            sweep_interval: Duration::from_secs(matchmaking.sweep_interval_secs),
        }
    }
}

impl From<&RewardsConfig> for RewardSettings {
    fn from(rewards: &RewardsConfig) -> Self {
        Self {
            table: RewardTable {
                win: rewards.win,
                draw: rewards.draw,
                loss: rewards.loss,
                per_mvp: rewards.per_mvp,
                per_clutch: rewards.per_clutch,
            },
            conflict_policy: RetryPolicy::new(
                rewards.storage_conflict_retries.saturating_add(1),
                Backoff::new(Duration::from_millis(20), Duration::from_millis(500)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_bus_settings_conversion() {
        let settings = BusSettings::from(&BusConfig::default());
        assert_eq!(settings.backend, BusBackend::Postgres);
        assert_eq!(settings.subscriber, SubscriberConfig::default());
        assert_eq!(settings.publish_policy.attempts, 5);
        assert_eq!(settings.publish_policy.backoff.delay(0), Duration::from_secs(1));
    }

    #[test]
    fn test_reward_settings_conversion() {
        let settings = RewardSettings::from(&RewardsConfig::default());
        assert_eq!(settings.table, RewardTable::default());
        // Three retries means four attempts in total
        assert_eq!(settings.conflict_policy.attempts, 4);

        let rewards = RewardsConfig {
            per_clutch: Decimal::new(25, 1),
            ..RewardsConfig::default()
        };
        assert_eq!(RewardSettings::from(&rewards).table.per_clutch, Decimal::new(25, 1));
    }

    #[test]
    fn test_matchmaking_conversion() {
        let config = MatchmakingConfig::from(&FileMatchmakingConfig::default());
        assert_eq!(config, MatchmakingConfig::default());
    }
}
