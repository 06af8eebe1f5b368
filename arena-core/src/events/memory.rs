//! Single-process bus transport.
//!
//! Keeps the same delivery semantics as the Postgres transport (leases,
//! per-consumer deduplication by event id, dead letters) in a mutex-guarded
//! table. Used by the test suite and by `backend = "memory"`.
//!
//! Settled deliveries are dropped from the table; the dedupe keys are kept
//! for the lifetime of the bus.

use super::bus::{BusError, DeadLetter, Delivery, EventBus};
use arena_sdk::objects::{EventKind, RawEnvelope};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryStatus {
    Pending,
    Running,
}

#[derive(Debug)]
struct StoredDelivery {
    id: i64,
    channel: EventKind,
    consumer: String,
    event_id: Uuid,
    message: serde_json::Value,
    attempt: u32,
    status: DeliveryStatus,
    run_at: Instant,
    lease_until: Option<Instant>,
}

impl StoredDelivery {
    fn is_claimable(&self, now: Instant) -> bool {
        match self.status {
            DeliveryStatus::Pending => self.run_at <= now,
            DeliveryStatus::Running => self.lease_until.is_some_and(|until| until <= now),
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    next_id: i64,
    unavailable: bool,
    subscriptions: HashSet<(EventKind, String)>,
    seen: HashSet<(EventKind, String, Uuid)>,
    deliveries: Vec<StoredDelivery>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Debug, Default)]
pub struct MemoryEventBus {
    state: Mutex<BusState>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `BrokerUnavailable` until switched back.
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    /// Deliveries of `consumer` on `channel` that are not settled yet.
    pub fn pending(&self, channel: EventKind, consumer: &str) -> usize {
        self.lock()
            .deliveries
            .iter()
            .filter(|d| d.channel == channel && d.consumer == consumer)
            .count()
    }

    #[cfg(test)]
    fn stored(&self) -> usize {
        self.lock().deliveries.len()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_available(&self) -> Result<MutexGuard<'_, BusState>, BusError> {
        let state = self.lock();
        if state.unavailable {
            return Err(BusError::BrokerUnavailable(
                "memory bus switched unavailable".to_string(),
            ));
        }
        Ok(state)
    }

    fn settle(
        &self,
        delivery: &Delivery,
        f: impl FnOnce(&mut StoredDelivery),
    ) -> Result<(), BusError> {
        let mut state = self.lock_available()?;
        if let Some(stored) = state
            .deliveries
            .iter_mut()
            .find(|d| d.id == delivery.delivery_id)
        {
            f(stored);
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, channel: EventKind, envelope: &RawEnvelope) -> Result<(), BusError> {
        let message = serde_json::to_value(envelope).map_err(|e| BusError::Encode(e.into()))?;
        let mut state = self.lock_available()?;
        let now = Instant::now();

        let mut consumers: Vec<String> = state
            .subscriptions
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, consumer)| consumer.clone())
            .collect();
        consumers.sort();

        for consumer in consumers {
            if !state
                .seen
                .insert((channel, consumer.clone(), envelope.event_id))
            {
                continue;
            }
            state.next_id += 1;
            let id = state.next_id;
            state.deliveries.push(StoredDelivery {
                id,
                channel,
                consumer,
                event_id: envelope.event_id,
                message: message.clone(),
                attempt: 0,
                status: DeliveryStatus::Pending,
                run_at: now,
                lease_until: None,
            });
        }
        Ok(())
    }

    async fn register(&self, channel: EventKind, consumer: &str) -> Result<(), BusError> {
        self.lock_available()?
            .subscriptions
            .insert((channel, consumer.to_string()));
        Ok(())
    }

    async fn claim(
        &self,
        channel: EventKind,
        consumer: &str,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<Delivery>, BusError> {
        let mut state = self.lock_available()?;
        let now = Instant::now();

        let mut ready: Vec<(Instant, i64)> = state
            .deliveries
            .iter()
            .filter(|d| d.channel == channel && d.consumer == consumer && d.is_claimable(now))
            .map(|d| (d.run_at, d.id))
            .collect();
        ready.sort();
        ready.truncate(limit as usize);
        let ids: HashSet<i64> = ready.iter().map(|(_, id)| *id).collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for stored in state.deliveries.iter_mut().filter(|d| ids.contains(&d.id)) {
            stored.status = DeliveryStatus::Running;
            stored.attempt += 1;
            stored.lease_until = Some(now + lease);
            claimed.push(Delivery {
                delivery_id: stored.id,
                event_id: stored.event_id,
                attempt: stored.attempt,
                message: stored.message.clone(),
            });
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError> {
        self.lock_available()?
            .deliveries
            .retain(|d| d.id != delivery.delivery_id);
        Ok(())
    }

    async fn retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        _error: &str,
    ) -> Result<(), BusError> {
        let run_at = Instant::now() + delay;
        self.settle(delivery, |stored| {
            stored.status = DeliveryStatus::Pending;
            stored.run_at = run_at;
            stored.lease_until = None;
        })
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BusError> {
        let mut state = self.lock_available()?;
        let Some(position) = state
            .deliveries
            .iter()
            .position(|d| d.id == delivery.delivery_id)
        else {
            return Ok(());
        };
        let stored = state.deliveries.remove(position);
        let record = DeadLetter {
            event_id: stored.event_id,
            consumer: stored.consumer,
            channel: stored.channel.to_string(),
            reason: reason.to_string(),
            attempts: stored.attempt,
            message: stored.message,
        };

        let exists = state
            .dead_letters
            .iter()
            .any(|d| d.event_id == record.event_id && d.consumer == record.consumer);
        if !exists {
            state.dead_letters.push(record);
        }
        Ok(())
    }
}
