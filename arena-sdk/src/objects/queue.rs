//! Queue request/response types for the matchmaking HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ladder::Ladder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueRequest {
    pub user_id: String,
    pub ladder: Ladder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveQueueRequest {
    pub user_id: String,
}

/// Ticket status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `arena-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Waiting,
    Matched,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub ticket_id: Uuid,
    pub user_id: String,
    pub ladder: Ladder,
    pub status: TicketStatus,
    pub match_id: Option<String>,
    /// Unix timestamp (seconds).
    pub joined_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveQueueResponse {
    pub cancelled: Vec<TicketResponse>,
}
