//! In-memory wallet for tests and local runs.

use super::{PaymentReference, WalletError, WalletRequest, WalletService};
use crate::domain::UserId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletOperation {
    Hold,
    Release,
    Refund,
    Deposit,
    Withdraw,
}

/// A transfer the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCall {
    pub operation: WalletOperation,
    pub request: WalletRequest,
    pub reference: PaymentReference,
}

#[derive(Debug, Default)]
struct MockState {
    failing_users: HashSet<UserId>,
    calls: Vec<WalletCall>,
    /// Replays by idempotency key return the first reference.
    by_key: HashMap<String, PaymentReference>,
    attempts: usize,
}

/// Mock wallet with per-user failure injection.
///
/// Clones share state, so a test can keep a handle while the service under
/// test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockWalletService {
    state: Arc<Mutex<MockState>>,
}

impl MockWalletService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer for `user` fails until [`restore_user`](Self::restore_user).
    pub fn with_failing_user(self, user: UserId) -> Self {
        self.fail_user(user);
        self
    }

    pub fn fail_user(&self, user: UserId) {
        self.lock().failing_users.insert(user);
    }

    pub fn restore_user(&self, user: &UserId) {
        self.lock().failing_users.remove(user);
    }

    /// Accepted transfers, in order. Replayed idempotency keys appear once.
    pub fn calls(&self) -> Vec<WalletCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, operation: WalletOperation) -> Vec<WalletCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Number of requests received, including failures and replays.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transfer(
        &self,
        operation: WalletOperation,
        request: &WalletRequest,
    ) -> Result<PaymentReference, WalletError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.failing_users.contains(&request.user_id) {
            return Err(WalletError::InsufficientFunds {
                user_id: request.user_id.clone(),
            });
        }
        if let Some(existing) = state.by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let reference = PaymentReference(format!("mock_{}", state.calls.len() + 1));
        state
            .by_key
            .insert(request.idempotency_key.clone(), reference.clone());
        state.calls.push(WalletCall {
            operation,
            request: request.clone(),
            reference: reference.clone(),
        });
        Ok(reference)
    }
}

#[async_trait]
impl WalletService for MockWalletService {
    async fn hold_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.transfer(WalletOperation::Hold, request)
    }

    async fn release_escrow(
        &self,
        request: &WalletRequest,
    ) -> Result<PaymentReference, WalletError> {
        self.transfer(WalletOperation::Release, request)
    }

    async fn refund_escrow(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.transfer(WalletOperation::Refund, request)
    }

    async fn deposit(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.transfer(WalletOperation::Deposit, request)
    }

    async fn withdraw(&self, request: &WalletRequest) -> Result<PaymentReference, WalletError> {
        self.transfer(WalletOperation::Withdraw, request)
    }
}
