use crate::db::repo::HoldOutcome;
use crate::db::Repository;
use crate::domain::{
    derive_transaction_id, Account, Decimal, Escrow, EscrowId, EscrowStatus, InstructionKind,
    OwnershipClass, Stake, StakeId, StakeValidationError, TimeMs, TransactionKind,
    TransactionRecord,
};
use crate::orchestration::recorder::{LedgerError, LedgerRecorder};
use crate::wallet::{WalletError, WalletRequest, WalletService};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
    #[error("Invalid stake: {0}")]
    InvalidStake(StakeValidationError),
    #[error("Stake already exists: {0}")]
    DuplicateStake(StakeId),
    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),
    #[error("Escrow {escrow_id} is {status} and no longer accepts stakes")]
    EscrowClosed {
        escrow_id: String,
        status: EscrowStatus,
    },
    #[error("Invalid escrow transition {from} -> {to}")]
    InvalidTransition { from: EscrowStatus, to: EscrowStatus },
    #[error("Escrow {0} changed concurrently")]
    ConcurrentUpdate(EscrowId),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<StakeValidationError> for EscrowError {
    fn from(err: StakeValidationError) -> Self {
        match err {
            StakeValidationError::NonPositivePrincipal(amount) => EscrowError::InvalidAmount(amount),
            other => EscrowError::InvalidStake(other),
        }
    }
}

/// Holds stakes in per-goal escrows and tracks each escrow's status.
#[derive(Clone)]
pub struct EscrowLifecycleManager {
    repo: Arc<Repository>,
    wallet: Arc<dyn WalletService>,
    recorder: Arc<LedgerRecorder>,
}

impl EscrowLifecycleManager {
    pub fn new(
        repo: Arc<Repository>,
        wallet: Arc<dyn WalletService>,
        recorder: Arc<LedgerRecorder>,
    ) -> Self {
        Self {
            repo,
            wallet,
            recorder,
        }
    }

    /// Validate a stake, move its principal into escrow and persist it.
    ///
    /// Validation happens before any side effect. The wallet hold is keyed by
    /// the stake id, so retrying a hold that failed after the wallet call
    /// does not take the funds twice.
    pub async fn hold(&self, stake: &Stake, ownership: OwnershipClass) -> Result<Escrow, EscrowError> {
        stake.validate()?;

        if self.repo.get_stake(&stake.id).await?.is_some() {
            return Err(EscrowError::DuplicateStake(stake.id.clone()));
        }
        if let Some(existing) = self.repo.find_escrow_for_goal(&stake.goal_id).await? {
            if existing.status != EscrowStatus::Held {
                return Err(EscrowError::EscrowClosed {
                    escrow_id: existing.id.to_string(),
                    status: existing.status,
                });
            }
            // A claimed escrow still reads `held` until settlement finishes.
            if self.repo.distribution_state(&existing.id).await?.is_some() {
                return Err(EscrowError::EscrowClosed {
                    escrow_id: existing.id.to_string(),
                    status: EscrowStatus::PendingDistribution,
                });
            }
        }

        let transaction_id = derive_transaction_id("hold", &[stake.id.as_str()]);
        let request = WalletRequest {
            amount: stake.principal,
            user_id: stake.user_id.clone(),
            goal_id: stake.goal_id.clone(),
            idempotency_key: transaction_id.clone(),
        };
        let reference = self.wallet.hold_escrow(&request).await?;

        let now = TimeMs::now();
        let escrow = match self.repo.hold_stake_atomic(stake, ownership, now).await? {
            HoldOutcome::Held(escrow) => escrow,
            HoldOutcome::DuplicateStake => return Err(EscrowError::DuplicateStake(stake.id.clone())),
            HoldOutcome::EscrowNotHeld(escrow_id, status) => {
                self.reverse_hold(stake, request).await?;
                return Err(EscrowError::EscrowClosed {
                    escrow_id: escrow_id.to_string(),
                    status,
                });
            }
        };

        let record = TransactionRecord::new(transaction_id, TransactionKind::EscrowHold, now)
            .debit(
                &Account::Wallet(stake.user_id.clone()),
                stake.principal,
                "stake principal held",
                Some(reference.as_str()),
            )
            .credit(
                &Account::Escrow(escrow.id.clone()),
                stake.principal,
                "stake principal held",
                Some(stake.id.as_str()),
            );
        match self.recorder.record(record).await {
            Ok(_) | Err(LedgerError::AlreadyCommitted(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!(
            stake_id = %stake.id,
            goal_id = %stake.goal_id,
            escrow_id = %escrow.id,
            principal = %stake.principal,
            "Stake held in escrow"
        );
        Ok(escrow)
    }

    /// Return funds taken by a hold whose stake could not be stored.
    async fn reverse_hold(&self, stake: &Stake, hold: WalletRequest) -> Result<(), EscrowError> {
        let request = WalletRequest {
            idempotency_key: derive_transaction_id("hold-reversal", &[stake.id.as_str()]),
            ..hold
        };
        let reference = self.wallet.refund_escrow(&request).await?;
        warn!(
            stake_id = %stake.id,
            goal_id = %stake.goal_id,
            reference = %reference,
            "Escrow closed during hold, funds returned"
        );
        Ok(())
    }

    pub async fn release(
        &self,
        escrow_id: &EscrowId,
        amount: Decimal,
        beneficiary: &str,
    ) -> Result<EscrowStatus, EscrowError> {
        self.instruct(escrow_id, InstructionKind::Release, amount, beneficiary)
            .await
    }

    pub async fn forfeit(
        &self,
        escrow_id: &EscrowId,
        amount: Decimal,
        beneficiary: &str,
    ) -> Result<EscrowStatus, EscrowError> {
        self.instruct(escrow_id, InstructionKind::Forfeit, amount, beneficiary)
            .await
    }

    pub async fn refund(
        &self,
        escrow_id: &EscrowId,
        amount: Decimal,
        beneficiary: &str,
    ) -> Result<EscrowStatus, EscrowError> {
        self.instruct(escrow_id, InstructionKind::Refund, amount, beneficiary)
            .await
    }

    /// Record a payout instruction. Money movement belongs to the wallet.
    async fn instruct(
        &self,
        escrow_id: &EscrowId,
        kind: InstructionKind,
        amount: Decimal,
        beneficiary: &str,
    ) -> Result<EscrowStatus, EscrowError> {
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount(amount));
        }

        let status = self
            .repo
            .record_instruction(escrow_id, kind, amount, beneficiary, TimeMs::now())
            .await?
            .ok_or_else(|| EscrowError::EscrowNotFound(escrow_id.to_string()))?;

        info!(
            escrow_id = %escrow_id,
            kind = kind.as_str(),
            amount = %amount,
            beneficiary = beneficiary,
            status = %status,
            "Escrow instruction recorded"
        );
        Ok(status)
    }

    /// Explicit status transition, validated against the escrow state machine.
    pub async fn set_status(
        &self,
        escrow_id: &EscrowId,
        status: EscrowStatus,
    ) -> Result<Escrow, EscrowError> {
        let escrow = self
            .repo
            .get_escrow(escrow_id)
            .await?
            .ok_or_else(|| EscrowError::EscrowNotFound(escrow_id.to_string()))?;

        if !escrow.status.can_transition_to(status) {
            return Err(EscrowError::InvalidTransition {
                from: escrow.status,
                to: status,
            });
        }
        if escrow.status == status {
            return Ok(escrow);
        }

        let now = TimeMs::now();
        if !self
            .repo
            .update_escrow_status(escrow_id, escrow.status, status, now)
            .await?
        {
            return Err(EscrowError::ConcurrentUpdate(escrow_id.clone()));
        }

        info!(escrow_id = %escrow_id, from = %escrow.status, to = %status, "Escrow status updated");
        Ok(Escrow {
            status,
            updated_at: now,
            ..escrow
        })
    }
}
