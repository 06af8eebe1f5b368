//! Event processors of the three services.
//!
//! - `MatchmakingQueue`: admits players, emits `matchmaking.queue.joined`,
//!   receives `server.spawn.requested`
//! - `SettlementService`: receives `match.completed`, credits wallets, emits
//!   `wallet.reward`
//! - `LeaderboardAggregator`: receives `wallet.reward`, recomputes standings,
//!   emits `leaderboard.update`
//!
//! Each implements `Processor<EventEnvelope>` and runs under a
//! [`Subscriber`](crate::events::Subscriber).

pub mod leaderboard;
pub mod matchmaking;
pub mod settlement;

pub use leaderboard::{LeaderboardAggregator, LeaderboardError};
pub use matchmaking::{MatchmakingQueue, QueueError};
pub use settlement::{SettlementError, SettlementReport, SettlementService};
