//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `POST /queue/join`              - enqueue a player on a ladder
//! - `POST /queue/leave`             - cancel every waiting ticket of a player
//! - `GET  /queue/{user_id}/{ladder}` - the player's waiting ticket
//! - `GET  /leaderboards/{period}`   - standings of the current window
//! - `GET  /wallets/{user_id}`       - balance and ledger of a player

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use arena_core::events::BusError;
use arena_core::processors::{LeaderboardError, QueueError, SettlementError};

use crate::state::AppState;

mod leaderboard;
mod queue;
mod wallet;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue/join", post(queue::join_queue))
        .route("/queue/leave", post(queue::leave_queue))
        .route("/queue/{user_id}/{ladder}", get(queue::get_ticket))
        .route("/leaderboards/{period}", get(leaderboard::get_standings))
        .route("/wallets/{user_id}", get(wallet::get_wallet))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in API handlers.
#[derive(Debug)]
enum ApiError {
    /// The service behind the route does not run in this process.
    ServiceDisabled(&'static str),
    /// The request is malformed.
    InvalidRequest(String),
    /// The player already has a waiting ticket on the ladder.
    AlreadyQueued(String),
    NotFound(&'static str),
    /// The event bus did not accept the write.
    BusUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::ServiceDisabled(service) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{service} is not enabled on this instance"),
            )
                .into_response(),
            ApiError::InvalidRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            ApiError::AlreadyQueued(reason) => (StatusCode::CONFLICT, reason).into_response(),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            ApiError::BusUnavailable(e) => {
                tracing::warn!(error = %e, "Event bus unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "event bus unavailable").into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::InvalidRequest(reason) => ApiError::InvalidRequest(reason),
            QueueError::AlreadyQueued { .. } => ApiError::AlreadyQueued(e.to_string()),
            QueueError::TicketNotFound { .. } => ApiError::NotFound("ticket not found"),
            QueueError::Bus(BusError::BrokerUnavailable(reason)) => {
                ApiError::BusUnavailable(reason)
            }
            QueueError::Bus(e) => ApiError::Internal(e.to_string()),
            QueueError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<LeaderboardError> for ApiError {
    fn from(e: LeaderboardError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
