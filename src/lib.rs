pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod notify;
pub mod orchestration;
pub mod wallet;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, DistributionResult, Escrow, EscrowStatus, GoalId, GoalOutcome, OwnershipClass, Stake,
    StakeId, StakeStatus, TimeMs, UserId,
};
pub use engine::{AccrualCalculator, FeeCalculator, ForfeitureDistributor};
pub use error::AppError;
pub use notify::{LogNotifier, Notifier};
pub use orchestration::{
    AccrualRefreshJob, AccrualRefreshResult, DistributionOrchestrator, EscrowLifecycleManager,
    LedgerRecorder,
};
pub use wallet::{HttpWalletService, MockWalletService, WalletService};
