use crate::orchestration::{DistributionError, EscrowError, LedgerError, RefreshError};
use crate::wallet::WalletError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::InvalidAmount(_) | EscrowError::InvalidStake(_) => {
                AppError::BadRequest(err.to_string())
            }
            EscrowError::EscrowNotFound(_) => AppError::NotFound(err.to_string()),
            EscrowError::DuplicateStake(_)
            | EscrowError::EscrowClosed { .. }
            | EscrowError::InvalidTransition { .. }
            | EscrowError::ConcurrentUpdate(_) => AppError::Conflict(err.to_string()),
            EscrowError::Wallet(WalletError::InsufficientFunds { .. })
            | EscrowError::Wallet(WalletError::Rejected(_)) => AppError::BadRequest(err.to_string()),
            EscrowError::Wallet(_) | EscrowError::Ledger(_) | EscrowError::Db(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<DistributionError> for AppError {
    fn from(err: DistributionError) -> Self {
        match err {
            DistributionError::EscrowNotFound(_) | DistributionError::DisputeNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            DistributionError::OutcomeNotRecorded(_)
            | DistributionError::DistributionInProgress { .. }
            | DistributionError::ClaimLost(_) => AppError::Conflict(err.to_string()),
            DistributionError::Escrow(inner) => inner.into(),
            DistributionError::Ledger(_) | DistributionError::Db(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::StakeNotFound(_) => AppError::NotFound(err.to_string()),
            RefreshError::NotLiquidatable { .. } => AppError::Conflict(err.to_string()),
            RefreshError::Db(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, EscrowStatus, GoalId, StakeId};

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_escrow_errors_map_to_status() {
        assert_eq!(
            status_of(EscrowError::InvalidAmount(Decimal::zero()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EscrowError::DuplicateStake(StakeId::new("s1")).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                EscrowError::InvalidTransition {
                    from: EscrowStatus::Released,
                    to: EscrowStatus::Held,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EscrowError::Wallet(WalletError::RateLimited).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_distribution_errors_map_to_status() {
        assert_eq!(
            status_of(DistributionError::EscrowNotFound(GoalId::new("g1")).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DistributionError::OutcomeNotRecorded(GoalId::new("g1")).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DistributionError::Escrow(EscrowError::EscrowNotFound("e1".into())).into()),
            StatusCode::NOT_FOUND
        );
    }
}
