//! Leaderboard standings as served to readers.

use serde::{Deserialize, Serialize};

use super::ladder::LeaderboardPeriod;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingResponse {
    pub rank: u32,
    pub user_id: String,
    pub wins: i64,
    pub streak: i64,
    pub headshot_ratio: f64,
    pub mvps: i64,
    pub clutches: i64,
    pub rating: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsResponse {
    pub period: LeaderboardPeriod,
    /// ISO date of the first day of the window.
    pub period_start: String,
    pub entries: Vec<StandingResponse>,
}
