//! Postgres bus transport.
//!
//! Publishing fans an event out into one `bus_deliveries` row per
//! registered consumer. Consumers claim rows with `FOR UPDATE SKIP LOCKED`,
//! so any number of worker processes can share a consumer name without
//! ever receiving the same delivery concurrently.
//!
//! ```sql
//! CREATE TABLE bus_deliveries (
//!     id BIGSERIAL PRIMARY KEY,
//!     consumer TEXT NOT NULL,
//!     channel TEXT NOT NULL,
//!     event_id UUID NOT NULL,
//!     message JSONB NOT NULL,
//!     status delivery_status NOT NULL DEFAULT 'pending',
//!     attempt INTEGER NOT NULL DEFAULT 0,
//!     run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     lease_expires_at TIMESTAMPTZ,
//!     last_error TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (consumer, channel, event_id)
//! );
//! ```

use super::bus::{BusError, Delivery, EventBus};
use arena_sdk::objects::{EventKind, RawEnvelope};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    event_id: Uuid,
    attempt: i32,
    message: serde_json::Value,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Delivery {
            delivery_id: row.id,
            event_id: row.event_id,
            attempt: u32::try_from(row.attempt).unwrap_or(0),
            message: row.message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgEventBus {
    pool: PgPool,
}

impl PgEventBus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventBus for PgEventBus {
    #[tracing::instrument(skip_all, err, name = "SQL:BusPublish", fields(channel = %channel))]
    async fn publish(&self, channel: EventKind, envelope: &RawEnvelope) -> Result<(), BusError> {
        let message = serde_json::to_value(envelope).map_err(|e| BusError::Encode(e.into()))?;
        sqlx::query(
            r#"
            INSERT INTO bus_deliveries (consumer, channel, event_id, message)
            SELECT consumer, channel, $2, $3
            FROM bus_subscriptions
            WHERE channel = $1
            ON CONFLICT (consumer, channel, event_id) DO NOTHING
            "#,
        )
        .bind(channel.as_str())
        .bind(envelope.event_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:BusRegister")]
    async fn register(&self, channel: EventKind, consumer: &str) -> Result<(), BusError> {
        sqlx::query(
            r#"
            INSERT INTO bus_subscriptions (channel, consumer)
            VALUES ($1, $2)
            ON CONFLICT (channel, consumer) DO NOTHING
            "#,
        )
        .bind(channel.as_str())
        .bind(consumer)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Claims pending deliveries that are due, plus running deliveries
    /// whose lease expired (their consumer crashed or stalled).
    #[tracing::instrument(skip_all, err, name = "SQL:BusClaim")]
    async fn claim(
        &self,
        channel: EventKind,
        consumer: &str,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<Delivery>, BusError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            WITH claimable AS (
                SELECT id
                FROM bus_deliveries
                WHERE channel = $1
                  AND consumer = $2
                  AND (
                    (status = 'pending' AND run_at <= NOW())
                    OR (status = 'running' AND lease_expires_at <= NOW())
                  )
                ORDER BY run_at ASC, id ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE bus_deliveries d
            SET status = 'running',
                attempt = d.attempt + 1,
                lease_expires_at = NOW() + make_interval(secs => $4),
                updated_at = NOW()
            FROM claimable
            WHERE d.id = claimable.id
            RETURNING d.id, d.event_id, d.attempt, d.message
            "#,
        )
        .bind(channel.as_str())
        .bind(consumer)
        .bind(i64::from(limit))
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries: Vec<Delivery> = rows.into_iter().map(Delivery::from).collect();
        deliveries.sort_by_key(|d| d.delivery_id);
        Ok(deliveries)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:BusAck")]
    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError> {
        sqlx::query(
            r#"
            UPDATE bus_deliveries
            SET status = 'done',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery.delivery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:BusRetry")]
    async fn retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        error: &str,
    ) -> Result<(), BusError> {
        sqlx::query(
            r#"
            UPDATE bus_deliveries
            SET status = 'pending',
                run_at = NOW() + make_interval(secs => $2),
                last_error = $3,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery.delivery_id)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:BusDeadLetter")]
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BusError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE bus_deliveries
            SET status = 'dead_letter',
                last_error = $2,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery.delivery_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO dead_letters (event_id, consumer, channel, message, reason, attempts)
            SELECT event_id, consumer, channel, message, $2, attempt
            FROM bus_deliveries
            WHERE id = $1
            ON CONFLICT (event_id, consumer) DO NOTHING
            "#,
        )
        .bind(delivery.delivery_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
