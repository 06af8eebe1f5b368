//! Subscriber runtime.
//!
//! Owns the acknowledgment contract between the bus and a handler: the
//! handler only reports what happened, the subscriber decides whether the
//! delivery is acknowledged, retried later, or dead-lettered.

use super::bus::{BusError, Delivery, EventBus};
use crate::utils::backoff::Backoff;
use arena_sdk::objects::{EnvelopeError, EventEnvelope, EventKind, RawEnvelope};
use futures_util::FutureExt;
use futures_util::future::join_all;
use kanau::processor::Processor;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What a handler reports back for one event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient failure. The event is redelivered after a backoff.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The event can never succeed. It is dead-lettered immediately.
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub batch_size: u32,
    /// Sleep between polls when no delivery was ready.
    pub poll_interval: Duration,
    /// Attempts before a retryable failure is dead-lettered.
    pub max_attempts: u32,
    pub processing_deadline: Duration,
    pub retry: Backoff,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            poll_interval: Duration::from_millis(500),
            max_attempts: 5,
            processing_deadline: Duration::from_secs(30),
            retry: Backoff::default(),
        }
    }
}

enum Disposition {
    Ack,
    Retry(String),
    DeadLetter(String),
}

pub struct Subscriber<H> {
    bus: Arc<dyn EventBus>,
    channel: EventKind,
    consumer: String,
    handler: Arc<H>,
    config: SubscriberConfig,
}

impl<H> Subscriber<H>
where
    H: Processor<EventEnvelope, Output = (), Error = HandlerError> + Send + Sync,
{
    pub fn new(
        bus: Arc<dyn EventBus>,
        channel: EventKind,
        consumer: impl Into<String>,
        handler: Arc<H>,
        config: SubscriberConfig,
    ) -> Self {
        Self {
            bus,
            channel,
            consumer: consumer.into(),
            handler,
            config,
        }
    }

    /// Register the consumer on its channel. Must happen before producers
    /// publish anything this consumer is expected to see.
    pub async fn register(&self) -> Result<(), BusError> {
        self.bus.register(self.channel, &self.consumer).await
    }

    /// Poll until shutdown. A batch that is in flight when the signal
    /// arrives is finished and settled first.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(channel = %self.channel, consumer = %self.consumer, "Subscriber started");

        loop {
            if *shutdown_rx.borrow() {
                info!(consumer = %self.consumer, "Subscriber received shutdown signal");
                break;
            }

            let handled = match self.poll_once().await {
                Ok(handled) => handled,
                Err(e) => {
                    warn!(consumer = %self.consumer, error = %e, "Failed to claim deliveries");
                    0
                }
            };
            if handled > 0 {
                continue;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(consumer = %self.consumer, "Subscriber received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(consumer = %self.consumer, "Subscriber shutdown complete");
    }

    /// Claim one batch, handle it concurrently, settle every delivery.
    ///
    /// Returns the number of deliveries claimed.
    pub async fn poll_once(&self) -> Result<usize, BusError> {
        let deliveries = self
            .bus
            .claim(
                self.channel,
                &self.consumer,
                self.config.batch_size,
                self.lease(),
            )
            .await?;
        let claimed = deliveries.len();
        join_all(deliveries.iter().map(|delivery| self.deliver(delivery))).await;
        Ok(claimed)
    }

    /// Outlives the processing deadline, so a delivery is not reclaimed
    /// while its handler may still be running.
    fn lease(&self) -> Duration {
        self.config
            .processing_deadline
            .saturating_mul(2)
            .max(Duration::from_secs(1))
    }

    async fn deliver(&self, delivery: &Delivery) {
        let settled = match self.handle(delivery).await {
            Disposition::Ack => self.bus.ack(delivery).await,
            Disposition::Retry(reason) if delivery.attempt >= self.config.max_attempts => {
                error!(
                    consumer = %self.consumer,
                    event_id = %delivery.event_id,
                    attempt = delivery.attempt,
                    error = %reason,
                    "Retries exhausted, dead-lettering event"
                );
                self.bus
                    .dead_letter(delivery, &format!("retries exhausted: {reason}"))
                    .await
            }
            Disposition::Retry(reason) => {
                let delay = self.config.retry.delay(delivery.attempt.saturating_sub(1));
                warn!(
                    consumer = %self.consumer,
                    event_id = %delivery.event_id,
                    attempt = delivery.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Handler failed, scheduling redelivery"
                );
                self.bus.retry(delivery, delay, &reason).await
            }
            Disposition::DeadLetter(reason) => {
                error!(
                    consumer = %self.consumer,
                    event_id = %delivery.event_id,
                    error = %reason,
                    "Dead-lettering event"
                );
                self.bus.dead_letter(delivery, &reason).await
            }
        };

        if let Err(e) = settled {
            warn!(
                consumer = %self.consumer,
                delivery_id = delivery.delivery_id,
                error = %e,
                "Failed to settle delivery, it redelivers when its lease expires"
            );
        }
    }

    async fn handle(&self, delivery: &Delivery) -> Disposition {
        let raw: RawEnvelope = match serde_json::from_value(delivery.message.clone()) {
            Ok(raw) => raw,
            Err(e) => return Disposition::DeadLetter(format!("invalid envelope json: {e}")),
        };

        let envelope = match EventEnvelope::decode_on(self.channel, raw) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::TypeMismatch { channel, found }) => {
                warn!(
                    consumer = %self.consumer,
                    event_id = %delivery.event_id,
                    %channel,
                    %found,
                    "Dropping event with mismatched type"
                );
                return Disposition::Ack;
            }
            Err(e) => return Disposition::DeadLetter(e.to_string()),
        };

        debug!(
            consumer = %self.consumer,
            event_id = %envelope.event_id,
            attempt = delivery.attempt,
            "Received event"
        );

        // A panicking handler fails its delivery, not the subscriber.
        let handled = AssertUnwindSafe(self.handler.process(envelope)).catch_unwind();
        let deadline = self.config.processing_deadline;
        match tokio::time::timeout(deadline, handled).await {
            Ok(Ok(Ok(()))) => Disposition::Ack,
            Ok(Ok(Err(HandlerError::Rejected(reason)))) => Disposition::DeadLetter(reason),
            Ok(Ok(Err(HandlerError::Retryable(reason)))) => Disposition::Retry(reason),
            Ok(Err(panic)) => {
                let reason = format!("handler panicked: {}", panic_message(&*panic));
                error!(
                    consumer = %self.consumer,
                    event_id = %delivery.event_id,
                    error = %reason,
                    "Handler panicked"
                );
                Disposition::Retry(reason)
            }
            Err(_) => Disposition::Retry(format!(
                "processing deadline of {}ms exceeded",
                deadline.as_millis()
            )),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
