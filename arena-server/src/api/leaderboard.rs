use super::ApiError;
use crate::state::AppState;
use arena_core::utils::utc_now;
use arena_sdk::objects::{LeaderboardPeriod, StandingResponse, StandingsResponse};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub(super) struct StandingsQuery {
    limit: Option<u32>,
}

/// `GET /leaderboards/{period}?limit=`: ranked rows of the window
/// containing the current UTC time.
pub(super) async fn get_standings(
    State(state): State<AppState>,
    Path(period): Path<LeaderboardPeriod>,
    Query(query): Query<StandingsQuery>,
) -> Result<Json<StandingsResponse>, ApiError> {
    let aggregator = state
        .leaderboard
        .as_ref()
        .ok_or(ApiError::ServiceDisabled("leaderboard"))?;

    let limit = match query.limit {
        None => DEFAULT_LIMIT,
        Some(0) => return Err(ApiError::InvalidRequest("limit must be positive".to_string())),
        Some(limit) => limit.min(MAX_LIMIT),
    };

    let (window, rows) = aggregator
        .standings(period.into(), utc_now(), i64::from(limit))
        .await?;

    let entries = rows
        .into_iter()
        .zip(1u32..)
        .map(|(row, rank)| StandingResponse {
            rank,
            user_id: row.user_id,
            wins: row.wins,
            streak: row.streak,
            headshot_ratio: row.headshot_ratio,
            mvps: row.mvps,
            clutches: row.clutches,
            rating: row.rating,
        })
        .collect();

    Ok(Json(StandingsResponse {
        period,
        period_start: window.start.to_string(),
        entries,
    }))
}
