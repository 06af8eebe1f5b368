//! Storage seams of the three services.
//!
//! Each service talks to its tables only through one of these traits. The
//! Postgres implementations live in [`postgres`]; processors are generic
//! over the trait so that they can run against an in-memory store in tests.

pub mod postgres;

use crate::entities::LeaderboardPeriod;
use crate::entities::Ladder;
use crate::entities::leaderboard_entry::LeaderboardEntry;
use crate::entities::match_history::SettledMatchStat;
use crate::entities::queue_ticket::QueueTicket;
use crate::entities::wallet::{LedgerEntry, Wallet};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

/// SQLSTATEs for serialization failure, deadlock and lock-not-available.
const CONFLICT_CODES: [&str; 3] = ["40001", "40P01", "55P03"];

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient transaction conflict. Safe to retry the whole transaction.
    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let code = e
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());
        match code.as_deref() {
            Some(code) if CONFLICT_CODES.contains(&code) => StoreError::Conflict(e.to_string()),
            _ => StoreError::Database(e),
        }
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Queue tickets, owned by matchmaking.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a WAITING ticket.
    ///
    /// Returns `None` when the user already has a WAITING ticket on `ladder`.
    async fn insert_waiting(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError>;

    async fn waiting_ticket(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError>;

    /// Cancel every WAITING ticket of the user and return them.
    async fn cancel_waiting(&self, user_id: &str) -> Result<Vec<QueueTicket>, StoreError>;

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Option<QueueTicket>, StoreError>;

    /// Mark the WAITING tickets of `user_ids` on `ladder` as MATCHED.
    async fn match_waiting(
        &self,
        match_id: &str,
        ladder: Ladder,
        user_ids: &[String],
    ) -> Result<Vec<QueueTicket>, StoreError>;

    async fn expire_waiting(
        &self,
        joined_before: PrimitiveDateTime,
    ) -> Result<Vec<QueueTicket>, StoreError>;
}

/// One player's reward for one match, with the stats line that goes into
/// the settled history alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnCredit {
    pub amount: Decimal,
    pub stat: SettledMatchStat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited { wallet_id: Uuid, balance: Decimal },
    /// The `(wallet, match, earn)` entry already existed; nothing changed.
    AlreadySettled { wallet_id: Uuid },
}

/// Wallets, ledger and settled match history, owned by settlement.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Credit one player atomically: find-or-create the wallet, insert the
    /// earn entry, record the stats line, add to the balance.
    async fn credit_earn(&self, credit: &EarnCredit) -> Result<CreditOutcome, StoreError>;

    async fn wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError>;

    async fn ledger(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Leaderboard rows, owned by the aggregator, plus read access to the
/// settled match history.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn match_participants(&self, match_id: &str)
    -> Result<Vec<SettledMatchStat>, StoreError>;

    /// Settled matches of `user_id` in `[from, until)`, oldest first.
    async fn player_history(
        &self,
        user_id: &str,
        from: PrimitiveDateTime,
        until: PrimitiveDateTime,
    ) -> Result<Vec<SettledMatchStat>, StoreError>;

    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError>;

    /// Rows of one window, ranked by rating, then wins, then user id.
    async fn standings(
        &self,
        period: LeaderboardPeriod,
        period_start: Date,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, StoreError>;
}
