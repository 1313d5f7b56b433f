use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::TimeMs;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub as_of_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: String,
    pub as_of_ms: i64,
}

/// Ledger balance of an account id such as `wallet:u1`, `escrow:<id>` or
/// `charity:pool`.
pub async fn get_balance(
    Path(account_id): Path<String>,
    Query(params): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    let as_of = params.as_of_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now);
    let balance = state.recorder.balance_as_of(&account_id, as_of).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance: balance.to_canonical_string(),
        as_of_ms: as_of.as_ms(),
    }))
}
