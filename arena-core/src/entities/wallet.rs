use crate::framework::DatabaseProcessor;
use arena_sdk::objects::LedgerEntryType as SdkLedgerEntryType;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: String,
    pub balance: Decimal,
    pub created_at: time::PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "ledger_entry_type")]
pub enum LedgerEntryType {
    Earn,
    Spend,
    Adjust,
}

impl From<LedgerEntryType> for SdkLedgerEntryType {
    fn from(value: LedgerEntryType) -> Self {
        match value {
            LedgerEntryType::Earn => SdkLedgerEntryType::Earn,
            LedgerEntryType::Spend => SdkLedgerEntryType::Spend,
            LedgerEntryType::Adjust => SdkLedgerEntryType::Adjust,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub wallet_id: Uuid,
    pub match_id: Option<String>,
    pub amount: Decimal,
    pub entry_type: LedgerEntryType,
    pub reason: String,
    pub created_at: time::PrimitiveDateTime,
}

impl Wallet {
    /// Find the wallet of `user_id`, creating it with a zero balance if
    /// missing, and lock its row for the rest of the transaction.
    ///
    /// Two concurrent callers for the same new user both run the insert;
    /// the unique `user_id` makes one of them a no-op, and both then lock
    /// the same row.
    pub async fn find_or_create_for_update_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: &str,
    ) -> Result<Wallet, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance)
            VALUES ($1, $2, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, created_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
    }

    /// Add `amount` to the balance and return the new balance.
    pub async fn add_to_balance_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wallet_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal, sqlx::Error> {
        sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE wallets SET balance = balance + $2
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
    }
}

impl LedgerEntry {
    /// Insert an `earn` entry for `(wallet_id, match_id)`.
    ///
    /// Returns `None` when the pair already has one. The check is the
    /// partial unique index `wallet_ledger_one_earn_per_match`, so two
    /// concurrent inserts cannot both succeed.
    pub async fn insert_earn_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wallet_id: Uuid,
        match_id: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO wallet_ledger (wallet_id, match_id, amount, entry_type, reason)
            VALUES ($1, $2, $3, 'earn', $4)
            ON CONFLICT (wallet_id, match_id) WHERE entry_type = 'earn' DO NOTHING
            RETURNING id
            "#,
        )
        .bind(wallet_id)
        .bind(match_id)
        .bind(amount)
        .bind(reason)
        .fetch_optional(&mut **tx)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetWalletByUser {
    pub user_id: String,
}

impl Processor<GetWalletByUser> for DatabaseProcessor {
    type Output = Option<Wallet>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWalletByUser")]
    async fn process(&self, query: GetWalletByUser) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, created_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(query.user_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// All ledger entries of a wallet, oldest first.
pub struct GetLedgerEntries {
    pub wallet_id: Uuid,
}

impl Processor<GetLedgerEntries> for DatabaseProcessor {
    type Output = Vec<LedgerEntry>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLedgerEntries")]
    async fn process(&self, query: GetLedgerEntries) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, wallet_id, match_id, amount, entry_type, reason, created_at
            FROM wallet_ledger
            WHERE wallet_id = $1
            ORDER BY id
            "#,
        )
        .bind(query.wallet_id)
        .fetch_all(&self.pool)
        .await
    }
}
