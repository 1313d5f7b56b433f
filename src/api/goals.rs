use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{Dispute, DisputeId, DistributionResult, Escrow, GoalId, GoalOutcome};
use crate::error::AppError;

pub async fn get_escrow(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Escrow>, AppError> {
    state
        .repo
        .find_escrow_for_goal(&GoalId::new(id.clone()))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Escrow for goal {}", id)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    pub goal_id: GoalId,
    pub outcome: GoalOutcome,
}

/// Body is the outcome itself, e.g. `{"kind": "group", "winners": ["u1"]}`.
pub async fn record_outcome(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(outcome): Json<GoalOutcome>,
) -> Result<Json<OutcomeResponse>, AppError> {
    let goal_id = GoalId::new(id);
    let outcome = state.distributions.record_outcome(&goal_id, &outcome).await?;
    Ok(Json(OutcomeResponse { goal_id, outcome }))
}

#[derive(Debug, Deserialize)]
pub struct OpenDisputeRequest {
    pub reason: String,
}

pub async fn open_dispute(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<OpenDisputeRequest>,
) -> Result<(StatusCode, Json<Dispute>), AppError> {
    if body.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason is required".into()));
    }
    let dispute = state
        .distributions
        .open_dispute(&GoalId::new(id), &body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

pub async fn resolve_dispute(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Dispute>, AppError> {
    Ok(Json(
        state.distributions.resolve_dispute(&DisputeId::new(id)).await?,
    ))
}

pub async fn distribute(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DistributionResult>, AppError> {
    Ok(Json(state.distributions.distribute(&GoalId::new(id)).await?))
}
