use crate::entities::LeaderboardPeriod;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub period: LeaderboardPeriod,
    pub period_start: time::Date,
    pub wins: i64,
    pub streak: i64,
    pub headshot_ratio: f64,
    pub mvps: i64,
    pub clutches: i64,
    pub rating: i64,
}

#[derive(Debug, Clone)]
/// Insert or replace the row of `(user_id, period, period_start)`.
pub struct UpsertLeaderboardEntry {
    pub entry: LeaderboardEntry,
}

impl Processor<UpsertLeaderboardEntry> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertLeaderboardEntry")]
    async fn process(&self, upsert: UpsertLeaderboardEntry) -> Result<(), sqlx::Error> {
        let entry = upsert.entry;
        sqlx::query(
            r#"
            INSERT INTO leaderboard_entries
                (user_id, period, period_start, wins, streak, headshot_ratio, mvps, clutches, rating)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, period, period_start) DO UPDATE SET
                wins = EXCLUDED.wins,
                streak = EXCLUDED.streak,
                headshot_ratio = EXCLUDED.headshot_ratio,
                mvps = EXCLUDED.mvps,
                clutches = EXCLUDED.clutches,
                rating = EXCLUDED.rating,
                updated_at = NOW() AT TIME ZONE 'utc'
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.period)
        .bind(entry.period_start)
        .bind(entry.wins)
        .bind(entry.streak)
        .bind(entry.headshot_ratio)
        .bind(entry.mvps)
        .bind(entry.clutches)
        .bind(entry.rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Ranked rows of one period window.
pub struct GetStandings {
    pub period: LeaderboardPeriod,
    pub period_start: time::Date,
    pub limit: i64,
}

impl Processor<GetStandings> for DatabaseProcessor {
    type Output = Vec<LeaderboardEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStandings")]
    async fn process(&self, query: GetStandings) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT user_id, period, period_start, wins, streak, headshot_ratio, mvps, clutches, rating
            FROM leaderboard_entries
            WHERE period = $1 AND period_start = $2
            ORDER BY rating DESC, wins DESC, user_id ASC
            LIMIT $3
            "#,
        )
        .bind(query.period)
        .bind(query.period_start)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}
