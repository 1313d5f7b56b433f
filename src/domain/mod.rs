//! Domain types for the staking engine.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Primitives: TimeMs and string identifiers
//! - Stakes, escrows, disputes and goal outcomes
//! - Double-entry ledger records

pub mod decimal;
pub mod dispute;
pub mod distribution;
pub mod escrow;
pub mod ledger;
pub mod primitives;
pub mod stake;

pub use decimal::{Decimal, MONEY_SCALE};
pub use dispute::{Dispute, DisputeStatus};
pub use distribution::{
    DistributionResult, GoalOutcome, PayoutFailure, PayoutStatus, StakeholderPayout,
};
pub use escrow::{Escrow, EscrowStatus, InstructionKind, OwnershipClass, Stakeholder};
pub use ledger::{
    derive_transaction_id, entries_balance, Account, AccountType, EntryType, LedgerEntry,
    TransactionKind, TransactionRecord,
};
pub use primitives::{DisputeId, EscrowId, GoalId, StakeId, TimeMs, UserId, MS_PER_DAY};
pub use stake::{
    AccrualMethod, AprModel, AprTier, RatePoint, RateSegment, Stake, StakeStatus,
    StakeValidationError,
};
