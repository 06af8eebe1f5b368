//! The event bus contract.
//!
//! Delivery is at-least-once. A consumer claims a batch of deliveries, and
//! each one stays leased to it until it is settled with [`EventBus::ack`],
//! [`EventBus::retry`] or [`EventBus::dead_letter`]. A lease that expires
//! unsettled makes the delivery claimable again.

use crate::utils::backoff::RetryPolicy;
use arena_sdk::objects::{EnvelopeError, EventEnvelope, EventKind, RawEnvelope};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BusError {
    /// The transport cannot accept the operation right now.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("failed to encode event: {0}")]
    Encode(#[from] EnvelopeError),
}

impl From<sqlx::Error> for BusError {
    fn from(e: sqlx::Error) -> Self {
        BusError::BrokerUnavailable(e.to_string())
    }
}

/// A claimed event, leased to one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_id: i64,
    pub event_id: Uuid,
    /// 1 on first delivery, incremented on every claim.
    pub attempt: u32,
    /// The envelope as published. Decoding is the consumer's job.
    pub message: serde_json::Value,
}

/// An event a consumer gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub event_id: Uuid,
    pub consumer: String,
    pub channel: String,
    pub reason: String,
    pub attempts: u32,
    pub message: serde_json::Value,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Announce an event on `channel`.
    ///
    /// Every consumer registered on the channel gets one delivery. An
    /// `event_id` that was already published to the channel is ignored.
    async fn publish(&self, channel: EventKind, envelope: &RawEnvelope) -> Result<(), BusError>;

    /// Declare a durable consumer on `channel`. Only events published after
    /// registration are delivered to it. Registering twice is a no-op.
    async fn register(&self, channel: EventKind, consumer: &str) -> Result<(), BusError>;

    /// Lease up to `limit` ready deliveries for `lease`.
    async fn claim(
        &self,
        channel: EventKind,
        consumer: &str,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<Delivery>, BusError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError>;

    /// Release the delivery for another attempt after `delay`.
    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str)
    -> Result<(), BusError>;

    /// Remove the delivery from the redelivery cycle and record it.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BusError>;
}

/// Publish `envelope` on its own channel, retrying `BrokerUnavailable` with
/// exponential backoff.
///
/// Every attempt carries the same `event_id`, so an attempt that reached the
/// broker before failing does not produce a second delivery.
pub async fn publish_with_retry(
    bus: &dyn EventBus,
    envelope: &EventEnvelope,
    policy: &RetryPolicy,
) -> Result<(), BusError> {
    let raw = envelope.to_raw()?;
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match bus.publish(envelope.kind(), &raw).await {
            Ok(()) => return Ok(()),
            Err(BusError::BrokerUnavailable(reason)) if attempt + 1 < attempts => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    channel = %envelope.kind(),
                    event_id = %envelope.event_id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Publish failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
