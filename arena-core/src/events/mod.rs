//! Event bus for the cross-service pipeline.
//!
//! # Event Flow
//!
//! 1. `MatchmakingQueue` publishes `matchmaking.queue.joined` -> orchestrator
//! 2. orchestrator publishes `server.spawn.requested` -> `MatchmakingQueue`
//! 3. match servers publish `match.completed` -> `SettlementService`
//! 4. `SettlementService` publishes `wallet.reward` -> `LeaderboardAggregator`
//! 5. `LeaderboardAggregator` publishes `leaderboard.update`
//!
//! Delivery is at-least-once. Events carry identifiers rather than
//! aggregates, and consumers re-read their own tables, so handling the same
//! event twice has no additional effect.

pub mod bus;
pub mod memory;
pub mod postgres;
pub mod subscriber;

pub use bus::{BusError, DeadLetter, Delivery, EventBus, publish_with_retry};
pub use memory::MemoryEventBus;
pub use postgres::PgEventBus;
pub use subscriber::{HandlerError, Subscriber, SubscriberConfig};
