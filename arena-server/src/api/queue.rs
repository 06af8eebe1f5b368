use super::ApiError;
use crate::state::AppState;
use arena_core::entities::queue_ticket::QueueTicket;
use arena_core::framework::DatabaseProcessor;
use arena_core::processors::MatchmakingQueue;
use arena_sdk::objects::{
    JoinQueueRequest, Ladder, LeaveQueueRequest, LeaveQueueResponse, TicketResponse,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

fn queue(state: &AppState) -> Result<&Arc<MatchmakingQueue<DatabaseProcessor>>, ApiError> {
    state
        .queue
        .as_ref()
        .ok_or(ApiError::ServiceDisabled("matchmaking"))
}

/// Convert a `QueueTicket` (DB model) into a `TicketResponse` (API model).
fn to_response(ticket: &QueueTicket) -> TicketResponse {
    TicketResponse {
        ticket_id: ticket.id,
        user_id: ticket.user_id.clone(),
        ladder: ticket.ladder.into(),
        status: ticket.status.into(),
        match_id: ticket.match_id.clone(),
        joined_at: ticket.joined_at.assume_utc().unix_timestamp(),
    }
}

/// `POST /queue/join`: 201 with the new ticket, 409 if already queued.
pub(super) async fn join_queue(
    State(state): State<AppState>,
    Json(request): Json<JoinQueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = queue(&state)?
        .enqueue(&request.user_id, request.ladder.into())
        .await?;
    Ok((StatusCode::CREATED, Json(to_response(&ticket))))
}

/// `POST /queue/leave`: cancelled tickets, empty when nothing was waiting.
pub(super) async fn leave_queue(
    State(state): State<AppState>,
    Json(request): Json<LeaveQueueRequest>,
) -> Result<Json<LeaveQueueResponse>, ApiError> {
    let cancelled = queue(&state)?.leave(&request.user_id).await?;
    Ok(Json(LeaveQueueResponse {
        cancelled: cancelled.iter().map(to_response).collect(),
    }))
}

/// `GET /queue/{user_id}/{ladder}`: the waiting ticket, 404 otherwise.
pub(super) async fn get_ticket(
    State(state): State<AppState>,
    Path((user_id, ladder)): Path<(String, Ladder)>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = queue(&state)?.status(&user_id, ladder.into()).await?;
    Ok(Json(to_response(&ticket)))
}
