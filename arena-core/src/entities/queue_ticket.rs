use crate::entities::Ladder;
use crate::framework::DatabaseProcessor;
use arena_sdk::objects::TicketStatus as SdkTicketStatus;
use kanau::processor::Processor;
use uuid::Uuid;

/// Queue ticket status for database operations.
///
/// `Waiting` is initial; `Matched` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "ticket_status")]
pub enum TicketStatus {
    Waiting,
    Matched,
    Cancelled,
}

impl From<TicketStatus> for SdkTicketStatus {
    fn from(value: TicketStatus) -> Self {
        match value {
            TicketStatus::Waiting => SdkTicketStatus::Waiting,
            TicketStatus::Matched => SdkTicketStatus::Matched,
            TicketStatus::Cancelled => SdkTicketStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QueueTicket {
    pub id: Uuid,
    pub user_id: String,
    pub ladder: Ladder,
    pub status: TicketStatus,
    pub match_id: Option<String>,
    pub joined_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

const TICKET_COLUMNS: &str = "id, user_id, ladder, status, match_id, joined_at, updated_at";

#[derive(Debug, Clone)]
/// Insert a new WAITING ticket.
///
/// The partial unique index `queue_tickets_one_waiting` rejects a second
/// WAITING ticket for the same `(user_id, ladder)` with SQLSTATE 23505.
pub struct InsertWaitingTicket {
    pub user_id: String,
    pub ladder: Ladder,
}

impl Processor<InsertWaitingTicket> for DatabaseProcessor {
    type Output = QueueTicket;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertWaitingTicket")]
    async fn process(&self, insert: InsertWaitingTicket) -> Result<QueueTicket, sqlx::Error> {
        let sql = format!(
            "INSERT INTO queue_tickets (id, user_id, ladder, status) \
             VALUES ($1, $2, $3, 'waiting') \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(Uuid::now_v7())
            .bind(insert.user_id)
            .bind(insert.ladder)
            .fetch_one(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Get the WAITING ticket of a user on a ladder.
pub struct GetWaitingTicket {
    pub user_id: String,
    pub ladder: Ladder,
}

impl Processor<GetWaitingTicket> for DatabaseProcessor {
    type Output = Option<QueueTicket>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWaitingTicket")]
    async fn process(&self, query: GetWaitingTicket) -> Result<Option<QueueTicket>, sqlx::Error> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM queue_tickets \
             WHERE user_id = $1 AND ladder = $2 AND status = 'waiting'"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(query.user_id)
            .bind(query.ladder)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Cancel every WAITING ticket of a user, on any ladder.
pub struct CancelWaitingTickets {
    pub user_id: String,
}

impl Processor<CancelWaitingTickets> for DatabaseProcessor {
    type Output = Vec<QueueTicket>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CancelWaitingTickets")]
    async fn process(&self, update: CancelWaitingTickets) -> Result<Vec<QueueTicket>, sqlx::Error> {
        let sql = format!(
            "UPDATE queue_tickets SET status = 'cancelled', updated_at = NOW() AT TIME ZONE 'utc' \
             WHERE user_id = $1 AND status = 'waiting' \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(update.user_id)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Cancel a single ticket if it is still WAITING.
pub struct CancelTicket {
    pub ticket_id: Uuid,
}

impl Processor<CancelTicket> for DatabaseProcessor {
    type Output = Option<QueueTicket>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CancelTicket")]
    async fn process(&self, update: CancelTicket) -> Result<Option<QueueTicket>, sqlx::Error> {
        let sql = format!(
            "UPDATE queue_tickets SET status = 'cancelled', updated_at = NOW() AT TIME ZONE 'utc' \
             WHERE id = $1 AND status = 'waiting' \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(update.ticket_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Move the WAITING tickets of the listed users on `ladder` to MATCHED.
///
/// Users without a WAITING ticket are simply not returned.
pub struct MatchWaitingTickets {
    pub match_id: String,
    pub ladder: Ladder,
    pub user_ids: Vec<String>,
}

impl Processor<MatchWaitingTickets> for DatabaseProcessor {
    type Output = Vec<QueueTicket>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MatchWaitingTickets")]
    async fn process(&self, update: MatchWaitingTickets) -> Result<Vec<QueueTicket>, sqlx::Error> {
        let sql = format!(
            "UPDATE queue_tickets SET status = 'matched', match_id = $1, updated_at = NOW() AT TIME ZONE 'utc' \
             WHERE ladder = $2 AND user_id = ANY($3) AND status = 'waiting' \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(update.match_id)
            .bind(update.ladder)
            .bind(update.user_ids)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Cancel WAITING tickets that joined before the cutoff.
pub struct ExpireWaitingTickets {
    pub joined_before: time::PrimitiveDateTime,
}

impl Processor<ExpireWaitingTickets> for DatabaseProcessor {
    type Output = Vec<QueueTicket>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ExpireWaitingTickets")]
    async fn process(&self, update: ExpireWaitingTickets) -> Result<Vec<QueueTicket>, sqlx::Error> {
        let sql = format!(
            "UPDATE queue_tickets SET status = 'cancelled', updated_at = NOW() AT TIME ZONE 'utc' \
             WHERE status = 'waiting' AND joined_at < $1 \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, QueueTicket>(&sql)
            .bind(update.joined_before)
            .fetch_all(&self.pool)
            .await
    }
}
