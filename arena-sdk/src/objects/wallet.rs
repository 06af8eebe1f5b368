//! Wallet balance and ledger as served to readers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger entry type for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `arena-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    Earn,
    Spend,
    Adjust,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub match_id: Option<String>,
    pub amount: Decimal,
    pub entry_type: LedgerEntryType,
    pub reason: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub wallet_id: Uuid,
    pub user_id: String,
    pub balance: Decimal,
    pub ledger: Vec<LedgerEntryResponse>,
}
