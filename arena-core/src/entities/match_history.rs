use crate::entities::MatchOutcome;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// One player's line of a settled match.
///
/// Written by settlement in the same transaction as the player's ledger
/// entry, so a row exists exactly when the player has been credited.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SettledMatchStat {
    pub match_id: String,
    pub user_id: String,
    pub result: MatchOutcome,
    pub kills: i64,
    pub deaths: i64,
    pub headshots: i64,
    pub mvps: i64,
    pub clutches: i64,
    pub rating_delta: Option<i64>,
    pub settled_at: time::PrimitiveDateTime,
}

const STAT_COLUMNS: &str =
    "match_id, user_id, result, kills, deaths, headshots, mvps, clutches, rating_delta, settled_at";

impl SettledMatchStat {
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        stat: &SettledMatchStat,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settled_match_stats
                (match_id, user_id, result, kills, deaths, headshots, mvps, clutches, rating_delta, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (match_id, user_id) DO NOTHING
            "#,
        )
        .bind(&stat.match_id)
        .bind(&stat.user_id)
        .bind(stat.result)
        .bind(stat.kills)
        .bind(stat.deaths)
        .bind(stat.headshots)
        .bind(stat.mvps)
        .bind(stat.clutches)
        .bind(stat.rating_delta)
        .bind(stat.settled_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetMatchParticipants {
    pub match_id: String,
}

impl Processor<GetMatchParticipants> for DatabaseProcessor {
    type Output = Vec<SettledMatchStat>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetMatchParticipants")]
    async fn process(&self, query: GetMatchParticipants) -> Result<Vec<SettledMatchStat>, sqlx::Error> {
        let sql = format!(
            "SELECT {STAT_COLUMNS} FROM settled_match_stats \
             WHERE match_id = $1 ORDER BY user_id"
        );
        sqlx::query_as::<_, SettledMatchStat>(&sql)
            .bind(query.match_id)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Settled matches of one player in `[from, until)`, oldest first.
pub struct GetPlayerHistory {
    pub user_id: String,
    pub from: time::PrimitiveDateTime,
    pub until: time::PrimitiveDateTime,
}

impl Processor<GetPlayerHistory> for DatabaseProcessor {
    type Output = Vec<SettledMatchStat>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPlayerHistory")]
    async fn process(&self, query: GetPlayerHistory) -> Result<Vec<SettledMatchStat>, sqlx::Error> {
        let sql = format!(
            "SELECT {STAT_COLUMNS} FROM settled_match_stats \
             WHERE user_id = $1 AND settled_at >= $2 AND settled_at < $3 \
             ORDER BY settled_at, match_id"
        );
        sqlx::query_as::<_, SettledMatchStat>(&sql)
            .bind(query.user_id)
            .bind(query.from)
            .bind(query.until)
            .fetch_all(&self.pool)
            .await
    }
}
