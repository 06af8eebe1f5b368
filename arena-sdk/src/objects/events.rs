//! Event envelope and payload types for the inter-service bus.
//!
//! Every event travels as a [`RawEnvelope`]:
//!
//! ```json
//! { "type": "match.completed", "payload": { ... }, "timestamp": "...", "eventId": "..." }
//! ```
//!
//! The `type` string doubles as the channel name. Decoding is two-stage so
//! that a consumer can tell a misrouted event (known type, wrong channel)
//! apart from a malformed one (unknown type, or a payload that does not
//! match its schema).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ladder::{Ladder, MatchOutcome};

/// Registered event kinds. The wire name is also the channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueueJoined,
    SpawnRequested,
    MatchCompleted,
    RewardSettled,
    LeaderboardUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::QueueJoined,
        EventKind::SpawnRequested,
        EventKind::MatchCompleted,
        EventKind::RewardSettled,
        EventKind::LeaderboardUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::QueueJoined => "matchmaking.queue.joined",
            EventKind::SpawnRequested => "server.spawn.requested",
            EventKind::MatchCompleted => "match.completed",
            EventKind::RewardSettled => "wallet.reward",
            EventKind::LeaderboardUpdated => "leaderboard.update",
        }
    }

    pub fn from_wire(s: &str) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoinedPayload {
    pub ticket_id: Uuid,
    pub user_id: String,
    pub ladder: Ladder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequestedPayload {
    pub match_id: String,
    pub ladder: Ladder,
    pub team_a: Vec<String>,
    pub team_b: Vec<String>,
}

impl SpawnRequestedPayload {
    /// All players of both teams.
    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.team_a.iter().chain(self.team_b.iter()).map(String::as_str)
    }
}

/// Per-player line of a completed match.
///
/// Counters are signed so that a malformed producer's negative values reach
/// validation instead of failing deep inside the JSON decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatchStats {
    pub user_id: String,
    pub result: MatchOutcome,
    pub kills: i64,
    pub deaths: i64,
    pub mvps: i64,
    pub clutches: i64,
    #[serde(default)]
    pub headshots: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_delta: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCompletedPayload {
    pub match_id: String,
    pub stats: Vec<PlayerMatchStats>,
}

/// Announces that every participant of a match has been credited.
///
/// Carries no amounts: the leaderboard re-reads the settled history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSettledPayload {
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdatedPayload {
    pub match_id: String,
    pub user_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Typed events
// ---------------------------------------------------------------------------

/// A bus event, discriminated by its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    QueueJoined(QueueJoinedPayload),
    SpawnRequested(SpawnRequestedPayload),
    MatchCompleted(MatchCompletedPayload),
    RewardSettled(RewardSettledPayload),
    LeaderboardUpdated(LeaderboardUpdatedPayload),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::QueueJoined(_) => EventKind::QueueJoined,
            BusEvent::SpawnRequested(_) => EventKind::SpawnRequested,
            BusEvent::MatchCompleted(_) => EventKind::MatchCompleted,
            BusEvent::RewardSettled(_) => EventKind::RewardSettled,
            BusEvent::LeaderboardUpdated(_) => EventKind::LeaderboardUpdated,
        }
    }

    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            BusEvent::QueueJoined(p) => serde_json::to_value(p),
            BusEvent::SpawnRequested(p) => serde_json::to_value(p),
            BusEvent::MatchCompleted(p) => serde_json::to_value(p),
            BusEvent::RewardSettled(p) => serde_json::to_value(p),
            BusEvent::LeaderboardUpdated(p) => serde_json::to_value(p),
        }
    }

    fn from_payload(kind: EventKind, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::QueueJoined => BusEvent::QueueJoined(serde_json::from_value(payload)?),
            EventKind::SpawnRequested => BusEvent::SpawnRequested(serde_json::from_value(payload)?),
            EventKind::MatchCompleted => BusEvent::MatchCompleted(serde_json::from_value(payload)?),
            EventKind::RewardSettled => BusEvent::RewardSettled(serde_json::from_value(payload)?),
            EventKind::LeaderboardUpdated => {
                BusEvent::LeaderboardUpdated(serde_json::from_value(payload)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// The envelope as it travels on the wire, with an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub event_id: Uuid,
}

/// A decoded, strongly-typed envelope.
///
/// `event_id` is generated once per logical occurrence and must be reused
/// on every retry of the same publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub timestamp: OffsetDateTime,
    pub event: BusEvent,
}

impl EventEnvelope {
    /// Wrap an event with a fresh time-ordered id.
    pub fn new(event: BusEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: OffsetDateTime::now_utc(),
            event,
        }
    }

    /// Wrap an event whose id is derived from `key`.
    ///
    /// Producers that may re-announce the same occurrence (for example after
    /// a redelivered input) use this so that every announcement carries the
    /// same id.
    pub fn derived(key: &str, event: BusEvent) -> Self {
        let name = format!("{}:{}", event.kind(), key);
        Self {
            event_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            timestamp: OffsetDateTime::now_utc(),
            event,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    pub fn to_raw(&self) -> Result<RawEnvelope, EnvelopeError> {
        Ok(RawEnvelope {
            event_type: self.kind().as_str().to_string(),
            payload: self.event.payload_json()?,
            timestamp: self.timestamp,
            event_id: self.event_id,
        })
    }

    /// Decode a raw envelope regardless of the channel it arrived on.
    pub fn decode(raw: RawEnvelope) -> Result<Self, EnvelopeError> {
        let kind = EventKind::from_wire(&raw.event_type)
            .ok_or_else(|| EnvelopeError::UnknownType(raw.event_type.clone()))?;
        let event = BusEvent::from_payload(kind, raw.payload)
            .map_err(|source| EnvelopeError::Payload { kind, source })?;
        Ok(Self {
            event_id: raw.event_id,
            timestamp: raw.timestamp,
            event,
        })
    }

    /// Decode a raw envelope delivered on `channel`.
    ///
    /// A registered type that does not belong to `channel` yields
    /// [`EnvelopeError::TypeMismatch`] before the payload is looked at.
    pub fn decode_on(channel: EventKind, raw: RawEnvelope) -> Result<Self, EnvelopeError> {
        match EventKind::from_wire(&raw.event_type) {
            Some(found) if found != channel => Err(EnvelopeError::TypeMismatch { channel, found }),
            _ => Self::decode(raw),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("event type {found} delivered on channel {channel}")]
    TypeMismatch { channel: EventKind, found: EventKind },
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        source: serde_json::Error,
    },
}
