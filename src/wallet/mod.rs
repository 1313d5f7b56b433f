//! Wallet provider abstraction: the only place money actually moves.

use crate::domain::{Decimal, GoalId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpWalletService;
pub use mock::{MockWalletService, WalletCall, WalletOperation};

/// A single transfer request.
///
/// `idempotency_key` is derived from the operation it settles, so a retried
/// request is recognised by the provider instead of moving money twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub amount: Decimal,
    pub user_id: UserId,
    pub goal_id: GoalId,
    pub idempotency_key: String,
}

/// Provider-issued reference for a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(pub String);

impl PaymentReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet provider operations.
///
/// Implementations must be safe to call concurrently for different users.
#[async_trait]
pub trait WalletService: Send + Sync + fmt::Debug {
    /// Move funds from the user's wallet into escrow for a goal.
    async fn hold_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError>;

    /// Pay funds held for a goal out to the user.
    async fn release_escrow(&self, request: &WalletRequest)
        -> Result<PaymentReference, WalletError>;

    /// Return held funds to the user without a settlement.
    async fn refund_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError>;

    async fn deposit(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError>;

    async fn withdraw(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError>;
}

/// Error type for wallet operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error from the provider
    HttpError { status: u16, message: String },
    /// Invalid or unexpected response body
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The user's wallet cannot cover the amount
    InsufficientFunds { user_id: UserId },
    /// The provider refused the transfer
    Rejected(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            WalletError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            WalletError::RateLimited => write!(f, "Rate limited"),
            WalletError::InsufficientFunds { user_id } => {
                write!(f, "Insufficient funds for user {}", user_id)
            }
            WalletError::Rejected(msg) => write!(f, "Transfer rejected: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_error_display() {
        let err = WalletError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = WalletError::HttpError {
            status: 503,
            message: "Server error".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Server error");

        let err = WalletError::InsufficientFunds {
            user_id: UserId::new("u1"),
        };
        assert_eq!(err.to_string(), "Insufficient funds for user u1");
    }

    #[test]
    fn test_request_json_shape() {
        let request = WalletRequest {
            amount: Decimal::from_str_canonical("110.88").unwrap(),
            user_id: UserId::new("u1"),
            goal_id: GoalId::new("g1"),
            idempotency_key: "release:abc".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "amount": "110.88",
                "userId": "u1",
                "goalId": "g1",
                "idempotencyKey": "release:abc"
            })
        );
    }
}
