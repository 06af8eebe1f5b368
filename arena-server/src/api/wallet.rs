use super::ApiError;
use crate::state::AppState;
use arena_core::entities::wallet::LedgerEntry;
use arena_sdk::objects::{LedgerEntryResponse, WalletResponse};
use axum::{
    Json,
    extract::{Path, State},
};

fn to_response(entry: LedgerEntry) -> LedgerEntryResponse {
    LedgerEntryResponse {
        id: entry.id,
        match_id: entry.match_id,
        amount: entry.amount,
        entry_type: entry.entry_type.into(),
        reason: entry.reason,
        created_at: entry.created_at.assume_utc().unix_timestamp(),
    }
}

/// `GET /wallets/{user_id}`: balance and full ledger, 404 before the
/// player's first settled match.
pub(super) async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let settlement = state
        .settlement
        .as_ref()
        .ok_or(ApiError::ServiceDisabled("settlement"))?;

    let wallet = settlement
        .wallet(&user_id)
        .await?
        .ok_or(ApiError::NotFound("wallet not found"))?;
    let ledger = settlement.ledger(wallet.id).await?;

    Ok(Json(WalletResponse {
        wallet_id: wallet.id,
        user_id: wallet.user_id,
        balance: wallet.balance,
        ledger: ledger.into_iter().map(to_response).collect(),
    }))
}
