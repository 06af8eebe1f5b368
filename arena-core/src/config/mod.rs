//! Runtime configuration types.
//!
//! These are the validated values processors run with. Parsing the TOML
//! file and applying CLI overrides is the server crate's job.

mod config_store;

pub use config_store::ConfigStore;

use rust_decimal::Decimal;
use std::time::Duration;

/// Coins credited per match.
///
/// `reward = base(result) + per_mvp * mvps + per_clutch * clutches`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTable {
    pub win: Decimal,
    pub draw: Decimal,
    pub loss: Decimal,
    pub per_mvp: Decimal,
    pub per_clutch: Decimal,
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            win: Decimal::from(10),
            draw: Decimal::from(5),
            loss: Decimal::from(1),
            per_mvp: Decimal::ONE,
            per_clutch: Decimal::ZERO,
        }
    }
}

/// Ticket lifetime settings for the matchmaking queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchmakingConfig {
    /// WAITING tickets older than this are cancelled by the sweeper.
    pub ticket_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            ticket_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
        }
    }
}
