//! HTTP wallet provider client.

use super::{PaymentReference, WalletError, WalletRequest, WalletService};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Wallet service backed by the provider's JSON API.
///
/// Every request carries an `Idempotency-Key` header, so transient failures
/// are retried with exponential backoff without risking a double transfer.
#[derive(Debug, Clone)]
pub struct HttpWalletService {
    client: Client,
    base_url: String,
}

impl HttpWalletService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_transfer(
        &self,
        path: &str,
        request: &WalletRequest,
    ) -> Result<PaymentReference, WalletError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        debug!(
            url = %url,
            user_id = %request.user_id,
            goal_id = %request.goal_id,
            amount = %request.amount,
            idempotency_key = %request.idempotency_key,
            "Wallet transfer"
        );

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .header("Idempotency-Key", &request.idempotency_key)
                .json(request)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(WalletError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(backoff::Error::transient(WalletError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(WalletError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if status == StatusCode::PAYMENT_REQUIRED {
                return Err(backoff::Error::permanent(WalletError::InsufficientFunds {
                    user_id: request.user_id.clone(),
                }));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(WalletError::HttpError {
                    status: status.as_u16(),
                    message,
                }));
            }

            let body = response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(WalletError::ParseError(e.to_string())))?;
            parse_reference(&body).map_err(backoff::Error::permanent)
        })
        .await
    }
}

#[async_trait]
impl WalletService for HttpWalletService {
    async fn hold_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.post_transfer("/v1/escrow/hold", request).await
    }

    async fn release_escrow(
        &self,
        request: &WalletRequest,
    ) -> Result<PaymentReference, WalletError> {
        self.post_transfer("/v1/escrow/release", request).await
    }

    async fn refund_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.post_transfer("/v1/escrow/refund", request).await
    }

    async fn deposit(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.post_transfer("/v1/deposits", request).await
    }

    async fn withdraw(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.post_transfer("/v1/withdrawals", request).await
    }
}

/// Extract the payment reference from a provider response.
///
/// A response that reports `"status": "rejected"` is a refusal even when the
/// HTTP status was 2xx.
fn parse_reference(body: &serde_json::Value) -> Result<PaymentReference, WalletError> {
    if body.get("status").and_then(|v| v.as_str()) == Some("rejected") {
        let reason = body
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("no reason given");
        return Err(WalletError::Rejected(reason.to_string()));
    }

    body.get("reference")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| PaymentReference(s.to_string()))
        .ok_or_else(|| WalletError::ParseError("Missing reference field".to_string()))
}
