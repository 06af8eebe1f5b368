//! MatchmakingQueue processor.
//!
//! The MatchmakingQueue is responsible for:
//! - Admitting players: one WAITING ticket per user and ladder
//! - Announcing admitted tickets on `matchmaking.queue.joined`
//! - Receiving `server.spawn.requested` and moving the listed players'
//!   tickets to MATCHED
//! - Cancelling tickets on leave, and sweeping tickets that waited too long

use crate::config::MatchmakingConfig;
use crate::entities::Ladder;
use crate::entities::queue_ticket::QueueTicket;
use crate::events::{BusError, EventBus, HandlerError, publish_with_retry};
use crate::stores::{StoreError, TicketStore};
use crate::utils::backoff::RetryPolicy;
use crate::utils::utc_now;
use arena_sdk::objects::{BusEvent, EventEnvelope, QueueJoinedPayload, SpawnRequestedPayload};
use itertools::Itertools;
use kanau::processor::Processor;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user {user_id} already has a waiting ticket on {ladder}")]
    AlreadyQueued { user_id: String, ladder: Ladder },

    #[error("user {user_id} has no waiting ticket on {ladder}")]
    TicketNotFound { user_id: String, ladder: Ladder },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<QueueError> for HandlerError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Store(_) | QueueError::Bus(_) => HandlerError::Retryable(e.to_string()),
            QueueError::InvalidRequest(_)
            | QueueError::AlreadyQueued { .. }
            | QueueError::TicketNotFound { .. } => HandlerError::Rejected(e.to_string()),
        }
    }
}

pub struct MatchmakingQueue<S> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    publish_policy: RetryPolicy,
}

impl<S: TicketStore> MatchmakingQueue<S> {
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, publish_policy: RetryPolicy) -> Self {
        Self {
            store,
            bus,
            publish_policy,
        }
    }

    /// Admit `user_id` to `ladder`.
    ///
    /// The ticket is persisted before it is announced. If the announcement
    /// cannot be delivered, the ticket is cancelled again so that the caller
    /// can simply retry.
    pub async fn enqueue(&self, user_id: &str, ladder: Ladder) -> Result<QueueTicket, QueueError> {
        if user_id.trim().is_empty() {
            return Err(QueueError::InvalidRequest("userId must not be empty".to_string()));
        }

        let Some(ticket) = self.store.insert_waiting(user_id, ladder).await? else {
            return Err(QueueError::AlreadyQueued {
                user_id: user_id.to_string(),
                ladder,
            });
        };

        let envelope = EventEnvelope::new(BusEvent::QueueJoined(QueueJoinedPayload {
            ticket_id: ticket.id,
            user_id: ticket.user_id.clone(),
            ladder: ticket.ladder.into(),
        }));
        if let Err(e) = publish_with_retry(self.bus.as_ref(), &envelope, &self.publish_policy).await
        {
            error!(
                ticket_id = %ticket.id,
                user_id = %ticket.user_id,
                error = %e,
                "Failed to announce ticket, cancelling it"
            );
            if let Err(cancel_err) = self.store.cancel_ticket(ticket.id).await {
                error!(ticket_id = %ticket.id, error = %cancel_err, "Failed to cancel unannounced ticket");
            }
            return Err(e.into());
        }

        info!(ticket_id = %ticket.id, user_id = %ticket.user_id, ladder = %ticket.ladder, "Player queued");
        Ok(ticket)
    }

    /// Cancel every WAITING ticket of `user_id`. Calling it again is a no-op.
    pub async fn leave(&self, user_id: &str) -> Result<Vec<QueueTicket>, QueueError> {
        let cancelled = self.store.cancel_waiting(user_id).await?;
        if cancelled.is_empty() {
            debug!(user_id, "Leave without waiting ticket");
        } else {
            info!(user_id, count = cancelled.len(), "Player left queue");
        }
        Ok(cancelled)
    }

    pub async fn status(&self, user_id: &str, ladder: Ladder) -> Result<QueueTicket, QueueError> {
        self.store
            .waiting_ticket(user_id, ladder)
            .await?
            .ok_or_else(|| QueueError::TicketNotFound {
                user_id: user_id.to_string(),
                ladder,
            })
    }

    /// Cancel WAITING tickets that joined more than `timeout` ago.
    pub async fn expire_stale(&self, timeout: Duration) -> Result<Vec<QueueTicket>, QueueError> {
        let Some(cutoff) = time::Duration::try_from(timeout)
            .ok()
            .and_then(|timeout| utc_now().checked_sub(timeout))
        else {
            return Ok(Vec::new());
        };
        Ok(self.store.expire_waiting(cutoff).await?)
    }

    /// Run `expire_stale` every `sweep_interval` until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        config: MatchmakingConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            timeout_secs = config.ticket_timeout.as_secs(),
            "Ticket sweeper started"
        );
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Ticket sweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.expire_stale(config.ticket_timeout).await {
                        Ok(expired) if !expired.is_empty() => {
                            info!(count = expired.len(), "Expired stale tickets");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Failed to expire stale tickets"),
                    }
                }
            }
        }

        info!("Ticket sweeper shutdown complete");
    }

    async fn on_spawn_requested(&self, payload: SpawnRequestedPayload) -> Result<(), QueueError> {
        if payload.match_id.is_empty() {
            return Err(QueueError::InvalidRequest("matchId must not be empty".to_string()));
        }

        let ladder = Ladder::from(payload.ladder);
        let players: Vec<String> = payload.players().unique().map(str::to_string).collect();

        let matched = self
            .store
            .match_waiting(&payload.match_id, ladder, &players)
            .await?;

        let matched_users: HashSet<&str> = matched.iter().map(|t| t.user_id.as_str()).collect();
        for user_id in players.iter().filter(|u| !matched_users.contains(u.as_str())) {
            debug!(
                match_id = %payload.match_id,
                user_id = %user_id,
                "No waiting ticket for spawned player"
            );
        }

        info!(
            match_id = %payload.match_id,
            ladder = %ladder,
            matched = matched.len(),
            players = players.len(),
            "Tickets matched"
        );
        Ok(())
    }
}

impl<S: TicketStore> Processor<EventEnvelope> for MatchmakingQueue<S> {
    type Output = ();
    type Error = HandlerError;

    async fn process(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        let kind = envelope.kind();
        match envelope.event {
            BusEvent::SpawnRequested(payload) => Ok(self.on_spawn_requested(payload).await?),
            BusEvent::QueueJoined(_)
            | BusEvent::MatchCompleted(_)
            | BusEvent::RewardSettled(_)
            | BusEvent::LeaderboardUpdated(_) => Err(HandlerError::Rejected(format!(
                "matchmaking does not consume {kind}"
            ))),
        }
    }
}
