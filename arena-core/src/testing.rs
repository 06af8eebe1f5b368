//! In-memory stores for unit tests.
//!
//! Enforce the same uniqueness rules as the Postgres schema: one WAITING
//! ticket per `(user, ladder)`, one wallet per user, one earn entry per
//! `(wallet, match)`, one stats line per `(match, user)`.

use crate::entities::leaderboard_entry::LeaderboardEntry;
use crate::entities::match_history::SettledMatchStat;
use crate::entities::queue_ticket::{QueueTicket, TicketStatus};
use crate::entities::wallet::{LedgerEntry, LedgerEntryType, Wallet};
use crate::entities::{Ladder, LeaderboardPeriod};
use crate::stores::{
    CreditOutcome, EarnCredit, LeaderboardStore, StoreError, TicketStore, WalletStore,
};
use crate::utils::utc_now;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

#[derive(Default)]
struct State {
    tickets: Vec<QueueTicket>,
    wallets: HashMap<String, Wallet>,
    ledger: Vec<LedgerEntry>,
    stats: Vec<SettledMatchStat>,
    entries: HashMap<(String, LeaderboardPeriod, Date), LeaderboardEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    conflicts: AtomicU32,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` credits fail with a storage conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Make every operation fail with a database error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Move the join time of every ticket back by `by`.
    pub fn backdate_tickets(&self, by: std::time::Duration) {
        let by = time::Duration::try_from(by).unwrap();
        for ticket in self.lock().tickets.iter_mut() {
            ticket.joined_at -= by;
        }
    }

    pub fn tickets(&self) -> Vec<QueueTicket> {
        self.lock().tickets.clone()
    }

    pub fn all_ledger(&self) -> Vec<LedgerEntry> {
        self.lock().ledger.clone()
    }

    pub fn all_wallets(&self) -> Vec<Wallet> {
        self.lock().wallets.values().cloned().collect()
    }

    pub fn all_entries(&self) -> Vec<LeaderboardEntry> {
        self.lock().entries.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn insert_waiting(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let taken = state.tickets.iter().any(|t| {
            t.user_id == user_id && t.ladder == ladder && t.status == TicketStatus::Waiting
        });
        if taken {
            return Ok(None);
        }
        let now = utc_now();
        let ticket = QueueTicket {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            ladder,
            status: TicketStatus::Waiting,
            match_id: None,
            joined_at: now,
            updated_at: now,
        };
        state.tickets.push(ticket.clone());
        Ok(Some(ticket))
    }

    async fn waiting_ticket(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError> {
        self.check_online()?;
        Ok(self
            .lock()
            .tickets
            .iter()
            .find(|t| {
                t.user_id == user_id && t.ladder == ladder && t.status == TicketStatus::Waiting
            })
            .cloned())
    }

    async fn cancel_waiting(&self, user_id: &str) -> Result<Vec<QueueTicket>, StoreError> {
        self.check_online()?;
        let mut cancelled = Vec::new();
        for ticket in self.lock().tickets.iter_mut() {
            if ticket.user_id == user_id && ticket.status == TicketStatus::Waiting {
                ticket.status = TicketStatus::Cancelled;
                ticket.updated_at = utc_now();
                cancelled.push(ticket.clone());
            }
        }
        Ok(cancelled)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Option<QueueTicket>, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let Some(ticket) = state
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id && t.status == TicketStatus::Waiting)
        else {
            return Ok(None);
        };
        ticket.status = TicketStatus::Cancelled;
        ticket.updated_at = utc_now();
        Ok(Some(ticket.clone()))
    }

    async fn match_waiting(
        &self,
        match_id: &str,
        ladder: Ladder,
        user_ids: &[String],
    ) -> Result<Vec<QueueTicket>, StoreError> {
        self.check_online()?;
        let mut matched = Vec::new();
        for ticket in self.lock().tickets.iter_mut() {
            if ticket.ladder == ladder
                && ticket.status == TicketStatus::Waiting
                && user_ids.contains(&ticket.user_id)
            {
                ticket.status = TicketStatus::Matched;
                ticket.match_id = Some(match_id.to_string());
                ticket.updated_at = utc_now();
                matched.push(ticket.clone());
            }
        }
        Ok(matched)
    }

    async fn expire_waiting(
        &self,
        joined_before: PrimitiveDateTime,
    ) -> Result<Vec<QueueTicket>, StoreError> {
        self.check_online()?;
        let mut expired = Vec::new();
        for ticket in self.lock().tickets.iter_mut() {
            if ticket.status == TicketStatus::Waiting && ticket.joined_at < joined_before {
                ticket.status = TicketStatus::Cancelled;
                ticket.updated_at = utc_now();
                expired.push(ticket.clone());
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn credit_earn(&self, credit: &EarnCredit) -> Result<CreditOutcome, StoreError> {
        self.check_online()?;
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }

        let stat = &credit.stat;
        let mut state = self.lock();
        let wallet = state
            .wallets
            .entry(stat.user_id.clone())
            .or_insert_with(|| Wallet {
                id: Uuid::now_v7(),
                user_id: stat.user_id.clone(),
                balance: Decimal::ZERO,
                created_at: utc_now(),
            });
        let wallet_id = wallet.id;

        let settled = state.ledger.iter().any(|e| {
            e.wallet_id == wallet_id
                && e.entry_type == LedgerEntryType::Earn
                && e.match_id.as_deref() == Some(stat.match_id.as_str())
        });
        if settled {
            return Ok(CreditOutcome::AlreadySettled { wallet_id });
        }

        let id = state.ledger.len() as i64 + 1;
        state.ledger.push(LedgerEntry {
            id,
            wallet_id,
            match_id: Some(stat.match_id.clone()),
            amount: credit.amount,
            entry_type: LedgerEntryType::Earn,
            reason: format!("match {}", stat.match_id),
            created_at: utc_now(),
        });
        let duplicate_stat = state
            .stats
            .iter()
            .any(|s| s.match_id == stat.match_id && s.user_id == stat.user_id);
        if !duplicate_stat {
            state.stats.push(stat.clone());
        }

        let wallet = state
            .wallets
            .get_mut(&stat.user_id)
            .ok_or_else(|| StoreError::Conflict("wallet vanished".to_string()))?;
        wallet.balance += credit.amount;
        Ok(CreditOutcome::Credited {
            wallet_id,
            balance: wallet.balance,
        })
    }

    async fn wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        self.check_online()?;
        Ok(self.lock().wallets.get(user_id).cloned())
    }

    async fn ledger(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        self.check_online()?;
        Ok(self
            .lock()
            .ledger
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LeaderboardStore for MemoryStore {
    async fn match_participants(
        &self,
        match_id: &str,
    ) -> Result<Vec<SettledMatchStat>, StoreError> {
        self.check_online()?;
        let mut stats: Vec<SettledMatchStat> = self
            .lock()
            .stats
            .iter()
            .filter(|s| s.match_id == match_id)
            .cloned()
            .collect();
        stats.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(stats)
    }

    async fn player_history(
        &self,
        user_id: &str,
        from: PrimitiveDateTime,
        until: PrimitiveDateTime,
    ) -> Result<Vec<SettledMatchStat>, StoreError> {
        self.check_online()?;
        let mut stats: Vec<SettledMatchStat> = self
            .lock()
            .stats
            .iter()
            .filter(|s| s.user_id == user_id && from <= s.settled_at && s.settled_at < until)
            .cloned()
            .collect();
        stats.sort_by(|a, b| {
            (a.settled_at, &a.match_id).cmp(&(b.settled_at, &b.match_id))
        });
        Ok(stats)
    }

    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
        self.check_online()?;
        self.lock().entries.insert(
            (entry.user_id.clone(), entry.period, entry.period_start),
            entry.clone(),
        );
        Ok(())
    }

    async fn standings(
        &self,
        period: LeaderboardPeriod,
        period_start: Date,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        self.check_online()?;
        let mut rows: Vec<LeaderboardEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.period == period && e.period_start == period_start)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.rating
                .cmp(&a.rating)
                .then(b.wins.cmp(&a.wins))
                .then(a.user_id.cmp(&b.user_id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}
