use super::{
    CreditOutcome, EarnCredit, LeaderboardStore, StoreError, TicketStore, WalletStore,
};
use crate::entities::leaderboard_entry::{GetStandings, LeaderboardEntry, UpsertLeaderboardEntry};
use crate::entities::match_history::{GetMatchParticipants, GetPlayerHistory, SettledMatchStat};
use crate::entities::queue_ticket::{
    CancelTicket, CancelWaitingTickets, ExpireWaitingTickets, GetWaitingTicket,
    InsertWaitingTicket, MatchWaitingTickets, QueueTicket,
};
use crate::entities::wallet::{GetLedgerEntries, GetWalletByUser, LedgerEntry, Wallet};
use crate::entities::{Ladder, LeaderboardPeriod};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl TicketStore for DatabaseProcessor {
    async fn insert_waiting(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError> {
        let insert = InsertWaitingTicket {
            user_id: user_id.to_string(),
            ladder,
        };
        match self.process(insert).await {
            Ok(ticket) => Ok(Some(ticket)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn waiting_ticket(
        &self,
        user_id: &str,
        ladder: Ladder,
    ) -> Result<Option<QueueTicket>, StoreError> {
        Ok(self
            .process(GetWaitingTicket {
                user_id: user_id.to_string(),
                ladder,
            })
            .await?)
    }

    async fn cancel_waiting(&self, user_id: &str) -> Result<Vec<QueueTicket>, StoreError> {
        Ok(self
            .process(CancelWaitingTickets {
                user_id: user_id.to_string(),
            })
            .await?)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid) -> Result<Option<QueueTicket>, StoreError> {
        Ok(self.process(CancelTicket { ticket_id }).await?)
    }

    async fn match_waiting(
        &self,
        match_id: &str,
        ladder: Ladder,
        user_ids: &[String],
    ) -> Result<Vec<QueueTicket>, StoreError> {
        Ok(self
            .process(MatchWaitingTickets {
                match_id: match_id.to_string(),
                ladder,
                user_ids: user_ids.to_vec(),
            })
            .await?)
    }

    async fn expire_waiting(
        &self,
        joined_before: PrimitiveDateTime,
    ) -> Result<Vec<QueueTicket>, StoreError> {
        Ok(self.process(ExpireWaitingTickets { joined_before }).await?)
    }
}

#[async_trait]
impl WalletStore for DatabaseProcessor {
    #[tracing::instrument(skip_all, err, name = "SQL:CreditEarn")]
    async fn credit_earn(&self, credit: &EarnCredit) -> Result<CreditOutcome, StoreError> {
        let stat = &credit.stat;
        let mut tx = self.pool.begin().await?;

        let wallet = Wallet::find_or_create_for_update_tx(&mut tx, &stat.user_id).await?;
        let reason = format!("match {}", stat.match_id);
        let inserted =
            LedgerEntry::insert_earn_tx(&mut tx, wallet.id, &stat.match_id, credit.amount, &reason)
                .await?;
        if inserted.is_none() {
            // Dropping the transaction rolls it back and releases the row lock.
            return Ok(CreditOutcome::AlreadySettled {
                wallet_id: wallet.id,
            });
        }

        SettledMatchStat::insert_tx(&mut tx, stat).await?;
        let balance = Wallet::add_to_balance_tx(&mut tx, wallet.id, credit.amount).await?;
        tx.commit().await?;

        Ok(CreditOutcome::Credited {
            wallet_id: wallet.id,
            balance,
        })
    }

    async fn wallet_by_user(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self
            .process(GetWalletByUser {
                user_id: user_id.to_string(),
            })
            .await?)
    }

    async fn ledger(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.process(GetLedgerEntries { wallet_id }).await?)
    }
}

#[async_trait]
impl LeaderboardStore for DatabaseProcessor {
    async fn match_participants(
        &self,
        match_id: &str,
    ) -> Result<Vec<SettledMatchStat>, StoreError> {
        Ok(self
            .process(GetMatchParticipants {
                match_id: match_id.to_string(),
            })
            .await?)
    }

    async fn player_history(
        &self,
        user_id: &str,
        from: PrimitiveDateTime,
        until: PrimitiveDateTime,
    ) -> Result<Vec<SettledMatchStat>, StoreError> {
        Ok(self
            .process(GetPlayerHistory {
                user_id: user_id.to_string(),
                from,
                until,
            })
            .await?)
    }

    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
        Ok(self
            .process(UpsertLeaderboardEntry {
                entry: entry.clone(),
            })
            .await?)
    }

    async fn standings(
        &self,
        period: LeaderboardPeriod,
        period_start: Date,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        Ok(self
            .process(GetStandings {
                period,
                period_start,
                limit,
            })
            .await?)
    }
}
