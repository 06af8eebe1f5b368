//! Application state shared across all request handlers.

use arena_core::framework::DatabaseProcessor;
use arena_core::processors::{LeaderboardAggregator, MatchmakingQueue, SettlementService};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// A service that is not enabled in this process is `None`; its routes
/// answer 503.
#[derive(Clone, Default)]
pub struct AppState {
    pub queue: Option<Arc<MatchmakingQueue<DatabaseProcessor>>>,
    pub settlement: Option<Arc<SettlementService<DatabaseProcessor>>>,
    pub leaderboard: Option<Arc<LeaderboardAggregator<DatabaseProcessor>>>,
}
