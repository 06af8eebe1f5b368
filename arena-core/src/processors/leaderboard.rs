//! LeaderboardAggregator processor.
//!
//! The LeaderboardAggregator is responsible for:
//! - Receiving `wallet.reward` events
//! - Re-reading the participants of the settled match from the match history
//! - Recomputing each participant's daily, weekly and monthly rows from
//!   their full history in that window (never from the event)
//! - Announcing the refreshed players on `leaderboard.update`
//!
//! Recomputing from history makes a redelivered event rewrite the same rows.

use crate::entities::LeaderboardPeriod;
use crate::entities::MatchOutcome;
use crate::entities::leaderboard_entry::LeaderboardEntry;
use crate::entities::match_history::SettledMatchStat;
use crate::events::{BusError, EventBus, HandlerError, publish_with_retry};
use crate::stores::{LeaderboardStore, StoreError};
use crate::utils::backoff::RetryPolicy;
use crate::utils::period::PeriodWindow;
use arena_sdk::objects::{BusEvent, EventEnvelope, LeaderboardUpdatedPayload};
use futures_util::future::try_join_all;
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{debug, info};

pub const BASE_RATING: i64 = 1000;
const WIN_DELTA: i64 = 25;
const LOSS_DELTA: i64 = -25;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    /// The match has no settled history yet. Retried until it shows up.
    #[error("match {0} is not settled yet")]
    MatchNotSettled(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event bus error: {0}")]
    Bus(#[from] BusError),
}

impl From<LeaderboardError> for HandlerError {
    fn from(e: LeaderboardError) -> Self {
        HandlerError::Retryable(e.to_string())
    }
}

/// Build a player's row for `window` from their settled matches in it,
/// oldest first.
pub fn compute_entry(
    user_id: &str,
    window: &PeriodWindow,
    history: &[SettledMatchStat],
) -> LeaderboardEntry {
    let wins = history
        .iter()
        .filter(|s| s.result == MatchOutcome::Win)
        .count() as i64;
    let streak = history
        .iter()
        .rev()
        .take_while(|s| s.result == MatchOutcome::Win)
        .count() as i64;
    let kills = saturating_sum(history.iter().map(|s| s.kills));
    let headshots = saturating_sum(history.iter().map(|s| s.headshots));
    let headshot_ratio = if kills > 0 {
        headshots as f64 / kills as f64
    } else {
        0.0
    };
    let delta = saturating_sum(history.iter().map(rating_delta));

    LeaderboardEntry {
        user_id: user_id.to_string(),
        period: window.period,
        period_start: window.start,
        wins,
        streak,
        headshot_ratio,
        mvps: saturating_sum(history.iter().map(|s| s.mvps)),
        clutches: saturating_sum(history.iter().map(|s| s.clutches)),
        rating: BASE_RATING.saturating_add(delta).max(0),
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

fn rating_delta(stat: &SettledMatchStat) -> i64 {
    stat.rating_delta.unwrap_or(match stat.result {
        MatchOutcome::Win => WIN_DELTA,
        MatchOutcome::Draw => 0,
        MatchOutcome::Loss => LOSS_DELTA,
    })
}

pub struct LeaderboardAggregator<S> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    publish_policy: RetryPolicy,
}

impl<S: LeaderboardStore> LeaderboardAggregator<S> {
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, publish_policy: RetryPolicy) -> Self {
        Self {
            store,
            bus,
            publish_policy,
        }
    }

    /// Recompute every row touched by `match_id` and announce the players.
    pub async fn refresh_match(&self, match_id: &str) -> Result<Vec<String>, LeaderboardError> {
        let participants = self.store.match_participants(match_id).await?;
        if participants.is_empty() {
            return Err(LeaderboardError::MatchNotSettled(match_id.to_string()));
        }

        try_join_all(participants.iter().map(|p| self.refresh_player(p))).await?;

        let user_ids: Vec<String> = participants.into_iter().map(|p| p.user_id).collect();
        let envelope = EventEnvelope::derived(
            match_id,
            BusEvent::LeaderboardUpdated(LeaderboardUpdatedPayload {
                match_id: match_id.to_string(),
                user_ids: user_ids.clone(),
            }),
        );
        publish_with_retry(self.bus.as_ref(), &envelope, &self.publish_policy).await?;

        info!(match_id, players = user_ids.len(), "Leaderboards refreshed");
        Ok(user_ids)
    }

    /// Recompute the player's rows for the windows containing `stat`.
    async fn refresh_player(&self, stat: &SettledMatchStat) -> Result<(), LeaderboardError> {
        for period in LeaderboardPeriod::ALL {
            let window = PeriodWindow::containing(period, stat.settled_at);
            let history = self
                .store
                .player_history(&stat.user_id, window.from, window.until)
                .await?;
            let entry = compute_entry(&stat.user_id, &window, &history);
            debug!(
                user_id = %entry.user_id,
                period = ?entry.period,
                period_start = %entry.period_start,
                rating = entry.rating,
                wins = entry.wins,
                "Leaderboard row recomputed"
            );
            self.store.upsert_entry(&entry).await?;
        }
        Ok(())
    }

    /// Ranked rows of the `period` window containing `at`.
    pub async fn standings(
        &self,
        period: LeaderboardPeriod,
        at: PrimitiveDateTime,
        limit: i64,
    ) -> Result<(PeriodWindow, Vec<LeaderboardEntry>), LeaderboardError> {
        let window = PeriodWindow::containing(period, at);
        let rows = self.store.standings(period, window.start, limit).await?;
        Ok((window, rows))
    }
}

impl<S: LeaderboardStore> Processor<EventEnvelope> for LeaderboardAggregator<S> {
    type Output = ();
    type Error = HandlerError;

    async fn process(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        let kind = envelope.kind();
        match envelope.event {
            BusEvent::RewardSettled(payload) => {
                self.refresh_match(&payload.match_id).await?;
                Ok(())
            }
            BusEvent::QueueJoined(_)
            | BusEvent::SpawnRequested(_)
            | BusEvent::MatchCompleted(_)
            | BusEvent::LeaderboardUpdated(_) => Err(HandlerError::Rejected(format!(
                "leaderboard does not consume {kind}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventBus;
    use crate::stores::{EarnCredit, WalletStore};
    use crate::testing::MemoryStore;
    use arena_sdk::objects::{EventKind, RewardSettledPayload};
    use rust_decimal::Decimal;
    use std::time::Duration;
    use time::macros::{date, datetime};

    fn stat(
        match_id: &str,
        user_id: &str,
        result: MatchOutcome,
        settled_at: PrimitiveDateTime,
    ) -> SettledMatchStat {
        SettledMatchStat {
            match_id: match_id.to_string(),
            user_id: user_id.to_string(),
            result,
            kills: 10,
            deaths: 8,
            headshots: 5,
            mvps: 1,
            clutches: 0,
            rating_delta: None,
            settled_at,
        }
    }

    async fn record(store: &MemoryStore, stat: SettledMatchStat) {
        store
            .credit_earn(&EarnCredit {
                amount: Decimal::ONE,
                stat,
            })
            .await
            .unwrap();
    }

    fn settled_event(match_id: &str) -> EventEnvelope {
        EventEnvelope::new(BusEvent::RewardSettled(RewardSettledPayload {
            match_id: match_id.to_string(),
        }))
    }

    async fn fixture() -> (
        Arc<MemoryStore>,
        Arc<MemoryEventBus>,
        LeaderboardAggregator<MemoryStore>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        bus.register(EventKind::LeaderboardUpdated, "observer")
            .await
            .unwrap();
        let aggregator = LeaderboardAggregator::new(store.clone(), bus.clone(), RetryPolicy::once());
        (store, bus, aggregator)
    }

    #[test]
    fn test_extreme_history_saturates() {
        let at = datetime!(2026-03-18 12:00);
        let window = PeriodWindow::containing(LeaderboardPeriod::Daily, at);
        let mut high = stat("m1", "u1", MatchOutcome::Win, at);
        high.rating_delta = Some(i64::MAX);
        high.kills = i64::MAX;
        high.headshots = i64::MAX;
        high.mvps = i64::MAX;
        let history = vec![high.clone(), high];

        let entry = compute_entry("u1", &window, &history);
        assert_eq!(entry.rating, i64::MAX);
        assert_eq!(entry.mvps, i64::MAX);
        assert_eq!(entry.headshot_ratio, 1.0);

        let mut low = stat("m2", "u1", MatchOutcome::Loss, at);
        low.rating_delta = Some(i64::MIN);
        let entry = compute_entry("u1", &window, &[low.clone(), low]);
        assert_eq!(entry.rating, 0);
    }

    #[test]
    fn test_compute_entry() {
        let at = datetime!(2026-03-18 12:00);
        let window = PeriodWindow::containing(LeaderboardPeriod::Daily, at);
        let mut history = vec![
            stat("m1", "u1", MatchOutcome::Loss, at),
            stat("m2", "u1", MatchOutcome::Win, at),
            stat("m3", "u1", MatchOutcome::Win, at),
        ];
        history[0].headshots = 0;
        history[2].mvps = 3;

        let entry = compute_entry("u1", &window, &history);
        assert_eq!(entry.wins, 2);
        assert_eq!(entry.streak, 2);
        assert_eq!(entry.mvps, 5);
        assert_eq!(entry.rating, 1000 - 25 + 25 + 25);
        assert!((entry.headshot_ratio - 10.0 / 30.0).abs() < 1e-9);
        assert_eq!(entry.period_start, date!(2026-03-18));
    }

    #[test]
    fn test_streak_ends_at_most_recent_match() {
        let at = datetime!(2026-03-18 12:00);
        let window = PeriodWindow::containing(LeaderboardPeriod::Daily, at);
        let history = vec![
            stat("m1", "u1", MatchOutcome::Win, at),
            stat("m2", "u1", MatchOutcome::Draw, at),
        ];
        assert_eq!(compute_entry("u1", &window, &history).streak, 0);
    }

    #[test]
    fn test_explicit_rating_delta_and_floor() {
        let at = datetime!(2026-03-18 12:00);
        let window = PeriodWindow::containing(LeaderboardPeriod::Daily, at);
        let mut history = vec![stat("m1", "u1", MatchOutcome::Win, at)];
        history[0].rating_delta = Some(40);
        assert_eq!(compute_entry("u1", &window, &history).rating, 1040);

        history[0].rating_delta = Some(-5000);
        history[0].kills = 0;
        history[0].headshots = 0;
        let entry = compute_entry("u1", &window, &history);
        assert_eq!(entry.rating, 0);
        assert_eq!(entry.headshot_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_refresh_recomputes_each_period() {
        let (store, bus, aggregator) = fixture().await;
        // Tuesday and Wednesday of the same week and month.
        record(&store, stat("m0", "u1", MatchOutcome::Win, datetime!(2026-03-17 20:00))).await;
        record(&store, stat("m1", "u1", MatchOutcome::Win, datetime!(2026-03-18 09:00))).await;
        record(&store, stat("m1", "u2", MatchOutcome::Loss, datetime!(2026-03-18 09:00))).await;

        aggregator.process(settled_event("m1")).await.unwrap();

        let (_, daily) = aggregator
            .standings(LeaderboardPeriod::Daily, datetime!(2026-03-18 23:00), 10)
            .await
            .unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].user_id, "u1");
        assert_eq!(daily[0].wins, 1);
        assert_eq!(daily[0].rating, 1025);
        assert_eq!(daily[1].rating, 975);

        let (window, weekly) = aggregator
            .standings(LeaderboardPeriod::Weekly, datetime!(2026-03-18 23:00), 10)
            .await
            .unwrap();
        assert_eq!(window.start, date!(2026-03-16));
        assert_eq!(weekly[0].wins, 2);
        assert_eq!(weekly[0].streak, 2);
        assert_eq!(weekly[0].rating, 1050);

        let (_, monthly) = aggregator
            .standings(LeaderboardPeriod::Monthly, datetime!(2026-03-01 0:00), 10)
            .await
            .unwrap();
        assert_eq!(monthly.len(), 2);

        let claimed = bus
            .claim(EventKind::LeaderboardUpdated, "observer", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].message["payload"]["userIds"][0], "u1");
    }

    #[tokio::test]
    async fn test_reprocessing_leaves_rows_unchanged() {
        let (store, bus, aggregator) = fixture().await;
        record(&store, stat("m1", "u1", MatchOutcome::Win, datetime!(2026-03-18 09:00))).await;

        aggregator.process(settled_event("m1")).await.unwrap();
        let mut first = store.all_entries();
        aggregator.process(settled_event("m1")).await.unwrap();
        let mut second = store.all_entries();

        let key = |e: &LeaderboardEntry| (e.period_start, e.user_id.clone());
        first.sort_by_key(key);
        second.sort_by_key(key);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(bus.pending(EventKind::LeaderboardUpdated, "observer"), 1);
    }

    #[tokio::test]
    async fn test_unsettled_match_is_retryable() {
        let (_, _, aggregator) = fixture().await;
        let err = aggregator.process(settled_event("ghost")).await.unwrap_err();
        assert!(matches!(err, HandlerError::Retryable(_)));
    }

    #[tokio::test]
    async fn test_ranking_order() {
        let (store, _, aggregator) = fixture().await;
        let at = datetime!(2026-03-18 09:00);
        let mut a = stat("m1", "a", MatchOutcome::Win, at);
        a.rating_delta = Some(10);
        let mut b = stat("m1", "b", MatchOutcome::Win, at);
        b.rating_delta = Some(10);
        let mut c = stat("m1", "c", MatchOutcome::Draw, at);
        c.rating_delta = Some(10);
        let d = stat("m1", "d", MatchOutcome::Win, at);
        for s in [c, b, d, a] {
            record(&store, s).await;
        }

        aggregator.refresh_match("m1").await.unwrap();
        let (_, rows) = aggregator
            .standings(LeaderboardPeriod::Daily, at, 10)
            .await
            .unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();
        // d: 1025; a, b: 1010 with one win; c: 1010 without.
        assert_eq!(order, vec!["d", "a", "b", "c"]);

        let (_, top) = aggregator
            .standings(LeaderboardPeriod::Daily, at, 2)
            .await
            .unwrap();
        assert_eq!(top.len(), 2);
    }
}
