use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{
    AccrualMethod, AprModel, Decimal, EscrowId, EscrowStatus, GoalId, OwnershipClass, Stake,
    StakeId, StakeStatus, TimeMs, UserId,
};
use crate::engine::{AccrualCalculator, FeeBreakdown, FeeCalculator};
use crate::error::AppError;
use crate::orchestration::AccrualRefreshResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakeRequest {
    /// Generated when omitted.
    pub id: Option<String>,
    pub goal_id: String,
    pub user_id: String,
    pub principal: Decimal,
    pub apr_model: AprModel,
    #[serde(default = "default_accrual_method")]
    pub accrual_method: AccrualMethod,
    pub fee_rate_on_stake: Decimal,
    pub fee_rate_on_withdrawal: Decimal,
    #[serde(default = "default_ownership")]
    pub ownership: OwnershipClass,
    pub start_ms: Option<i64>,
    pub deadline_ms: i64,
}

fn default_accrual_method() -> AccrualMethod {
    AccrualMethod::Simple
}

fn default_ownership() -> OwnershipClass {
    OwnershipClass::Individual
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakeResponse {
    pub stake: Stake,
    pub escrow_id: EscrowId,
    pub escrow_status: EscrowStatus,
    pub total_principal: String,
}

pub async fn create_stake(
    State(state): State<AppState>,
    Json(body): Json<CreateStakeRequest>,
) -> Result<(StatusCode, Json<CreateStakeResponse>), AppError> {
    if body.goal_id.trim().is_empty() || body.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("goalId and userId are required".into()));
    }

    let start_at = body.start_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now);
    let stake = Stake {
        id: body.id.map(StakeId::new).unwrap_or_else(StakeId::generate),
        goal_id: GoalId::new(body.goal_id),
        user_id: UserId::new(body.user_id),
        principal: body.principal,
        apr_model: body.apr_model,
        accrual_method: body.accrual_method,
        fee_rate_on_stake: body.fee_rate_on_stake,
        fee_rate_on_withdrawal: body.fee_rate_on_withdrawal,
        accrued_amount: Decimal::zero(),
        status: StakeStatus::Active,
        start_at,
        last_accrual_at: start_at,
        deadline: TimeMs::new(body.deadline_ms),
    };

    let escrow = state.escrows.hold(&stake, body.ownership).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateStakeResponse {
            stake,
            escrow_id: escrow.id,
            escrow_status: escrow.status,
            total_principal: escrow.total_principal.to_canonical_string(),
        }),
    ))
}

async fn load_stake(state: &AppState, id: &str) -> Result<Stake, AppError> {
    state
        .repo
        .get_stake(&StakeId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stake {}", id)))
}

pub async fn get_stake(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Stake>, AppError> {
    Ok(Json(load_stake(&state, &id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualQuery {
    pub as_of_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualResponse {
    pub stake_id: StakeId,
    pub principal: String,
    /// Accrued as of `asOfMs`; never below what was already committed.
    pub accrued_amount: String,
    pub stored_accrued_amount: String,
    pub current_value: String,
    pub status: StakeStatus,
    pub as_of_ms: i64,
}

pub async fn get_accrual(
    Path(id): Path<String>,
    Query(params): Query<AccrualQuery>,
    State(state): State<AppState>,
) -> Result<Json<AccrualResponse>, AppError> {
    let stake = load_stake(&state, &id).await?;
    let as_of = params.as_of_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now);

    let accrued = AccrualCalculator::calculate_accrued_amount(&stake, as_of).max(stake.accrued_amount);

    Ok(Json(AccrualResponse {
        stake_id: stake.id,
        principal: stake.principal.to_canonical_string(),
        accrued_amount: accrued.to_canonical_string(),
        stored_accrued_amount: stake.accrued_amount.to_canonical_string(),
        current_value: (stake.principal + accrued).to_canonical_string(),
        status: stake.status,
        as_of_ms: as_of.as_ms(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesQuery {
    pub as_of_ms: Option<i64>,
    pub project_to_ms: Option<i64>,
}

pub async fn get_fees(
    Path(id): Path<String>,
    Query(params): Query<FeesQuery>,
    State(state): State<AppState>,
) -> Result<Json<FeeBreakdown>, AppError> {
    let stake = load_stake(&state, &id).await?;
    let as_of = params.as_of_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now);
    let project_to = params.project_to_ms.map(TimeMs::new);
    if let Some(target) = project_to {
        if target < as_of {
            return Err(AppError::BadRequest("projectToMs must be >= asOfMs".into()));
        }
    }

    Ok(Json(FeeCalculator::breakdown(&stake, as_of, project_to)))
}

pub async fn liquidate_stake(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let stake_id = StakeId::new(id);
    state.refresh.request_liquidation(&stake_id).await?;
    Ok(Json(serde_json::json!({
        "stakeId": stake_id,
        "status": StakeStatus::PendingLiquidation,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub user: Option<String>,
}

pub async fn refresh_accruals(
    Query(params): Query<RefreshQuery>,
    State(state): State<AppState>,
) -> Result<Json<AccrualRefreshResult>, AppError> {
    let user = params.user.map(UserId::new);
    Ok(Json(state.refresh.refresh_accruals(user.as_ref()).await?))
}
