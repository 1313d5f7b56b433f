//! Stateful workflows over the repository, the wallet and the ledger.
//!
//! - `recorder` - double-entry ledger recording
//! - `escrow` - escrow holds, instructions and status changes
//! - `distribution` - settlement of a goal's escrow
//! - `refresh` - periodic accrual refresh

pub mod distribution;
pub mod escrow;
pub mod recorder;
pub mod refresh;

pub use distribution::{DistributionError, DistributionOrchestrator};
pub use escrow::{EscrowError, EscrowLifecycleManager};
pub use recorder::{LedgerError, LedgerRecorder};
pub use refresh::{AccrualRefreshJob, AccrualRefreshResult, RefreshError};
