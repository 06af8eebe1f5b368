//! SettlementService processor.
//!
//! The SettlementService is responsible for:
//! - Receiving `match.completed` events
//! - Validating the payload and computing each player's reward
//! - Crediting every player exactly once, in one transaction per player
//! - Announcing the settled match on `wallet.reward`
//!
//! Exactly-once crediting rests on the storage layer: the ledger accepts at
//! most one `earn` entry per `(wallet, match)`. A redelivered or concurrently
//! processed event finds that entry and changes nothing.

use crate::config::{ConfigStore, RewardTable};
use crate::entities::match_history::SettledMatchStat;
use crate::entities::wallet::{LedgerEntry, Wallet};
use crate::events::{BusError, EventBus, HandlerError, publish_with_retry};
use crate::stores::{CreditOutcome, EarnCredit, StoreError, WalletStore};
use crate::utils::backoff::RetryPolicy;
use crate::utils::utc_now;
use arena_sdk::objects::{
    BusEvent, EventEnvelope, MatchCompletedPayload, MatchOutcome, PlayerMatchStats,
    RewardSettledPayload,
};
use futures_util::future::join_all;
use itertools::Itertools;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SettlementError {
    /// The event can never be settled. Not retried.
    #[error("invalid match payload: {0}")]
    InvalidMatchPayload(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<SettlementError> for HandlerError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::InvalidMatchPayload(_) => HandlerError::Rejected(e.to_string()),
            SettlementError::Store(_) | SettlementError::Bus(_) => {
                HandlerError::Retryable(e.to_string())
            }
        }
    }
}

/// Largest accepted per-match counter.
pub const MAX_COUNTER: i64 = i32::MAX as i64;
/// Largest accepted absolute `ratingDelta` of one match.
pub const MAX_RATING_DELTA: i64 = 10_000;

/// Reward of one player. Depends only on the stats line and the table.
///
/// Fails instead of overflowing when the table and counters multiply past
/// what `Decimal` can hold.
pub fn reward_for(
    table: &RewardTable,
    stats: &PlayerMatchStats,
) -> Result<Decimal, SettlementError> {
    let base = match stats.result {
        MatchOutcome::Win => table.win,
        MatchOutcome::Draw => table.draw,
        MatchOutcome::Loss => table.loss,
    };
    table
        .per_mvp
        .checked_mul(Decimal::from(stats.mvps))
        .and_then(|mvp| base.checked_add(mvp))
        .and_then(|sum| {
            table
                .per_clutch
                .checked_mul(Decimal::from(stats.clutches))
                .and_then(|clutch| sum.checked_add(clutch))
        })
        .ok_or_else(|| {
            SettlementError::InvalidMatchPayload(format!(
                "reward of player {} overflows",
                stats.user_id
            ))
        })
}

/// Reject payloads that can never be settled.
pub fn validate(payload: &MatchCompletedPayload) -> Result<(), SettlementError> {
    let invalid = |reason: String| Err(SettlementError::InvalidMatchPayload(reason));

    if payload.match_id.trim().is_empty() {
        return invalid("matchId must not be empty".to_string());
    }
    if payload.stats.is_empty() {
        return invalid(format!("match {} has no players", payload.match_id));
    }
    if let Some(user_id) = payload.stats.iter().map(|s| &s.user_id).duplicates().next() {
        return invalid(format!("player {user_id} listed more than once"));
    }
    for stats in &payload.stats {
        if stats.user_id.trim().is_empty() {
            return invalid("userId must not be empty".to_string());
        }
        let counters = [
            ("kills", stats.kills),
            ("deaths", stats.deaths),
            ("mvps", stats.mvps),
            ("clutches", stats.clutches),
            ("headshots", stats.headshots),
        ];
        if let Some((name, value)) = counters.iter().find(|(_, value)| *value < 0) {
            return invalid(format!("player {} has negative {name}: {value}", stats.user_id));
        }
        if let Some((name, value)) = counters.iter().find(|(_, value)| *value > MAX_COUNTER) {
            return invalid(format!("player {} has {name} out of range: {value}", stats.user_id));
        }
        if let Some(delta) = stats.rating_delta
            && !(-MAX_RATING_DELTA..=MAX_RATING_DELTA).contains(&delta)
        {
            return invalid(format!(
                "player {} has ratingDelta out of range: {delta}",
                stats.user_id
            ));
        }
        if stats.headshots > stats.kills {
            return invalid(format!(
                "player {} has more headshots ({}) than kills ({})",
                stats.user_id, stats.headshots, stats.kills
            ));
        }
    }
    Ok(())
}

/// Outcome of settling one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettlementReport {
    pub credited: usize,
    pub already_settled: usize,
}

pub struct SettlementService<S> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    rewards: ConfigStore<RewardTable>,
    /// Per-player budget for storage conflicts.
    conflict_policy: RetryPolicy,
    publish_policy: RetryPolicy,
}

impl<S: WalletStore> SettlementService<S> {
    pub fn new(
        store: Arc<S>,
        bus: Arc<dyn EventBus>,
        rewards: ConfigStore<RewardTable>,
        conflict_policy: RetryPolicy,
        publish_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            bus,
            rewards,
            conflict_policy,
            publish_policy,
        }
    }

    /// Credit every player of the match, then announce it.
    ///
    /// Players are credited concurrently and independently. If any of them
    /// fails, the error is returned after the others have finished; the
    /// ones that went through are found already settled on redelivery.
    pub async fn settle(
        &self,
        payload: &MatchCompletedPayload,
    ) -> Result<SettlementReport, SettlementError> {
        validate(payload)?;
        let table = self.rewards.snapshot().await;
        let settled_at = utc_now();

        let credits = payload
            .stats
            .iter()
            .map(|stats| {
                Ok(EarnCredit {
                    amount: reward_for(&table, stats)?,
                    stat: SettledMatchStat {
                        match_id: payload.match_id.clone(),
                        user_id: stats.user_id.clone(),
                        result: stats.result.into(),
                        kills: stats.kills,
                        deaths: stats.deaths,
                        headshots: stats.headshots,
                        mvps: stats.mvps,
                        clutches: stats.clutches,
                        rating_delta: stats.rating_delta,
                        settled_at,
                    },
                })
            })
            .collect::<Result<Vec<EarnCredit>, SettlementError>>()?;

        let outcomes = join_all(credits.iter().map(|credit| self.credit(credit))).await;

        let mut report = SettlementReport::default();
        for outcome in outcomes {
            match outcome? {
                CreditOutcome::Credited { .. } => report.credited += 1,
                CreditOutcome::AlreadySettled { .. } => report.already_settled += 1,
            }
        }

        let envelope = EventEnvelope::derived(
            &payload.match_id,
            BusEvent::RewardSettled(RewardSettledPayload {
                match_id: payload.match_id.clone(),
            }),
        );
        publish_with_retry(self.bus.as_ref(), &envelope, &self.publish_policy).await?;

        info!(
            match_id = %payload.match_id,
            credited = report.credited,
            already_settled = report.already_settled,
            "Match settled"
        );
        Ok(report)
    }

    /// Credit one player, retrying storage conflicts.
    async fn credit(&self, credit: &EarnCredit) -> Result<CreditOutcome, StoreError> {
        let attempts = self.conflict_policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.store.credit_earn(credit).await {
                Ok(outcome) => {
                    match &outcome {
                        CreditOutcome::Credited { balance, .. } => debug!(
                            match_id = %credit.stat.match_id,
                            user_id = %credit.stat.user_id,
                            amount = %credit.amount,
                            balance = %balance,
                            "Player credited"
                        ),
                        CreditOutcome::AlreadySettled { .. } => debug!(
                            match_id = %credit.stat.match_id,
                            user_id = %credit.stat.user_id,
                            "Player already settled"
                        ),
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() && attempt + 1 < attempts => {
                    let delay = self.conflict_policy.backoff.delay(attempt);
                    warn!(
                        match_id = %credit.stat.match_id,
                        user_id = %credit.stat.user_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Storage conflict, retrying credit"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn wallet(&self, user_id: &str) -> Result<Option<Wallet>, SettlementError> {
        Ok(self.store.wallet_by_user(user_id).await?)
    }

    pub async fn ledger(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, SettlementError> {
        Ok(self.store.ledger(wallet_id).await?)
    }
}

impl<S: WalletStore> Processor<EventEnvelope> for SettlementService<S> {
    type Output = ();
    type Error = HandlerError;

    async fn process(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        let kind = envelope.kind();
        match envelope.event {
            BusEvent::MatchCompleted(payload) => {
                self.settle(&payload).await?;
                Ok(())
            }
            BusEvent::QueueJoined(_)
            | BusEvent::SpawnRequested(_)
            | BusEvent::RewardSettled(_)
            | BusEvent::LeaderboardUpdated(_) => Err(HandlerError::Rejected(format!(
                "settlement does not consume {kind}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::wallet::LedgerEntryType;
    use crate::events::MemoryEventBus;
    use crate::testing::MemoryStore;
    use crate::utils::backoff::Backoff;
    use arena_sdk::objects::{EventKind, RawEnvelope};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        bus: Arc<MemoryEventBus>,
        service: SettlementService<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        bus.register(EventKind::RewardSettled, "leaderboard")
            .await
            .unwrap();
        let service = SettlementService::new(
            store.clone(),
            bus.clone(),
            ConfigStore::new(RewardTable::default()),
            RetryPolicy::new(
                4,
                Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
            ),
            RetryPolicy::once(),
        );
        Fixture {
            store,
            bus,
            service,
        }
    }

    fn player(user_id: &str, result: MatchOutcome, mvps: i64) -> PlayerMatchStats {
        PlayerMatchStats {
            user_id: user_id.to_string(),
            result,
            kills: 10,
            deaths: 5,
            mvps,
            clutches: 0,
            headshots: 4,
            rating_delta: None,
        }
    }

    fn completed(match_id: &str, stats: Vec<PlayerMatchStats>) -> MatchCompletedPayload {
        MatchCompletedPayload {
            match_id: match_id.to_string(),
            stats,
        }
    }

    fn assert_wallet_invariant(store: &MemoryStore) {
        let ledger = store.all_ledger();
        for wallet in store.all_wallets() {
            let sum: Decimal = ledger
                .iter()
                .filter(|e| e.wallet_id == wallet.id)
                .map(|e| e.amount)
                .sum();
            assert_eq!(wallet.balance, sum, "wallet of {}", wallet.user_id);
        }
    }

    #[test]
    fn test_reward_for() {
        let table = RewardTable::default();
        assert_eq!(
            reward_for(&table, &player("u1", MatchOutcome::Win, 2)).unwrap(),
            Decimal::from(12)
        );
        assert_eq!(
            reward_for(&table, &player("u1", MatchOutcome::Draw, 0)).unwrap(),
            Decimal::from(5)
        );

        let table = RewardTable {
            per_clutch: Decimal::from(3),
            ..RewardTable::default()
        };
        let mut stats = player("u1", MatchOutcome::Loss, 1);
        stats.clutches = 2;
        assert_eq!(reward_for(&table, &stats).unwrap(), Decimal::from(1 + 1 + 6));
    }

    #[test]
    fn test_reward_overflow_is_an_error() {
        let table = RewardTable {
            per_mvp: Decimal::MAX,
            ..RewardTable::default()
        };
        let stats = player("u1", MatchOutcome::Win, MAX_COUNTER);
        assert!(matches!(
            reward_for(&table, &stats),
            Err(SettlementError::InvalidMatchPayload(_))
        ));

        let table = RewardTable {
            per_mvp: Decimal::from(100_000_000_000i64),
            ..RewardTable::default()
        };
        let reward = reward_for(&table, &player("u1", MatchOutcome::Win, MAX_COUNTER)).unwrap();
        assert_eq!(
            reward,
            Decimal::from(10) + Decimal::from(100_000_000_000i64) * Decimal::from(MAX_COUNTER)
        );
    }

    #[test]
    fn test_validate_rejects_malformed_payloads() {
        let ok = completed("m1", vec![player("u1", MatchOutcome::Win, 0)]);
        assert!(validate(&ok).is_ok());

        let mut negative = ok.clone();
        negative.stats[0].deaths = -1;
        let mut headshots = ok.clone();
        headshots.stats[0].headshots = 11;
        let mut duplicate = ok.clone();
        duplicate.stats.push(player("u1", MatchOutcome::Loss, 0));
        let mut unnamed = ok.clone();
        unnamed.stats[0].user_id = String::new();
        let mut huge_delta = ok.clone();
        huge_delta.stats[0].rating_delta = Some(i64::MAX);
        let mut low_delta = ok.clone();
        low_delta.stats[0].rating_delta = Some(-MAX_RATING_DELTA - 1);
        let mut huge_counter = ok.clone();
        huge_counter.stats[0].mvps = i64::MAX;

        for payload in [
            completed("", vec![player("u1", MatchOutcome::Win, 0)]),
            completed("m1", vec![]),
            negative,
            headshots,
            duplicate,
            unnamed,
            huge_delta,
            low_delta,
            huge_counter,
        ] {
            assert!(
                matches!(validate(&payload), Err(SettlementError::InvalidMatchPayload(_))),
                "{payload:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_settle_credits_and_announces() {
        let f = fixture().await;
        let payload = completed(
            "m1",
            vec![
                player("u1", MatchOutcome::Win, 2),
                player("u2", MatchOutcome::Loss, 0),
            ],
        );

        let report = f.service.settle(&payload).await.unwrap();
        assert_eq!(report.credited, 2);

        let wallet = f.service.wallet("u1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(12));
        let ledger = f.service.ledger(wallet.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].entry_type, LedgerEntryType::Earn);
        assert_eq!(ledger[0].match_id.as_deref(), Some("m1"));
        assert_eq!(
            f.service.wallet("u2").await.unwrap().unwrap().balance,
            Decimal::ONE
        );
        assert_wallet_invariant(&f.store);

        let claimed = f
            .bus
            .claim(EventKind::RewardSettled, "leaderboard", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        let raw: RawEnvelope = serde_json::from_value(claimed[0].message.clone()).unwrap();
        assert_eq!(raw.payload["matchId"], "m1");
    }

    #[tokio::test]
    async fn test_redelivery_credits_once() {
        let f = fixture().await;
        let event = EventEnvelope::new(BusEvent::MatchCompleted(completed(
            "m1",
            vec![player("u1", MatchOutcome::Win, 2)],
        )));

        for _ in 0..5 {
            f.service.process(event.clone()).await.unwrap();
        }

        let wallet = f.service.wallet("u1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(12));
        assert_eq!(f.service.ledger(wallet.id).await.unwrap().len(), 1);
        assert_wallet_invariant(&f.store);
        // Re-announcements share one event id and collapse in the bus.
        assert_eq!(f.bus.pending(EventKind::RewardSettled, "leaderboard"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_settlement_credits_once() {
        let f = fixture().await;
        let payload = completed(
            "m1",
            vec![
                player("u1", MatchOutcome::Win, 2),
                player("u2", MatchOutcome::Draw, 1),
            ],
        );

        let (a, b) = tokio::join!(f.service.settle(&payload), f.service.settle(&payload));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.credited + b.credited, 2);
        assert_eq!(a.already_settled + b.already_settled, 2);

        assert_eq!(f.store.all_ledger().len(), 2);
        assert_wallet_invariant(&f.store);
    }

    #[tokio::test]
    async fn test_storage_conflicts_are_retried() {
        let f = fixture().await;
        f.store.inject_conflicts(3);

        let report = f
            .service
            .settle(&completed("m1", vec![player("u1", MatchOutcome::Win, 0)]))
            .await
            .unwrap();
        assert_eq!(report.credited, 1);
        assert_eq!(
            f.service.wallet("u1").await.unwrap().unwrap().balance,
            Decimal::from(10)
        );
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_retryable() {
        let f = fixture().await;
        f.store.inject_conflicts(100);

        let event = EventEnvelope::new(BusEvent::MatchCompleted(completed(
            "m1",
            vec![player("u1", MatchOutcome::Win, 0)],
        )));
        let err = f.service.process(event).await.unwrap_err();
        assert!(matches!(err, HandlerError::Retryable(_)));
        assert!(f.store.all_ledger().is_empty());
        assert_eq!(f.bus.pending(EventKind::RewardSettled, "leaderboard"), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let f = fixture().await;
        let mut stats = player("u1", MatchOutcome::Win, 0);
        stats.kills = -3;
        let event = EventEnvelope::new(BusEvent::MatchCompleted(completed("m1", vec![stats])));

        let err = f.service.process(event).await.unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(_)));
        assert!(f.store.all_wallets().is_empty());
    }

    #[tokio::test]
    async fn test_extreme_rating_delta_is_rejected_before_crediting() {
        let f = fixture().await;
        let mut stats = player("u1", MatchOutcome::Win, 0);
        stats.rating_delta = Some(i64::MAX);
        let event = EventEnvelope::new(BusEvent::MatchCompleted(completed("m1", vec![stats])));

        let err = f.service.process(event).await.unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(_)));
        assert!(f.store.all_ledger().is_empty());
        assert_eq!(f.bus.pending(EventKind::RewardSettled, "leaderboard"), 0);

        let mut edge = player("u2", MatchOutcome::Win, 0);
        edge.rating_delta = Some(-MAX_RATING_DELTA);
        let report = f.service.settle(&completed("m2", vec![edge])).await.unwrap();
        assert_eq!(report.credited, 1);
    }

    #[tokio::test]
    async fn test_announcement_failure_redelivers_safely() {
        let f = fixture().await;
        let event = EventEnvelope::new(BusEvent::MatchCompleted(completed(
            "m1",
            vec![player("u1", MatchOutcome::Win, 2)],
        )));

        f.bus.set_available(false);
        let err = f.service.process(event.clone()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Retryable(_)));

        f.bus.set_available(true);
        f.service.process(event).await.unwrap();

        assert_eq!(
            f.service.wallet("u1").await.unwrap().unwrap().balance,
            Decimal::from(12)
        );
        assert_eq!(f.bus.pending(EventKind::RewardSettled, "leaderboard"), 1);
    }

    #[tokio::test]
    async fn test_reloaded_table_applies_to_next_match() {
        let f = fixture().await;
        f.service
            .rewards
            .update(RewardTable {
                win: Decimal::from(20),
                ..RewardTable::default()
            })
            .await;

        f.service
            .settle(&completed("m1", vec![player("u1", MatchOutcome::Win, 0)]))
            .await
            .unwrap();
        assert_eq!(
            f.service.wallet("u1").await.unwrap().unwrap().balance,
            Decimal::from(20)
        );
    }

    #[tokio::test]
    async fn test_rejects_foreign_events() {
        let f = fixture().await;
        let event = EventEnvelope::new(BusEvent::RewardSettled(RewardSettledPayload {
            match_id: "m1".to_string(),
        }));
        assert!(matches!(
            f.service.process(event).await,
            Err(HandlerError::Rejected(_))
        ));
    }
}
