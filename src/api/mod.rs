pub mod accounts;
pub mod goals;
pub mod health;
pub mod stakes;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::ForfeitureDistributor;
use crate::notify::Notifier;
use crate::orchestration::{
    AccrualRefreshJob, DistributionOrchestrator, EscrowLifecycleManager, LedgerRecorder,
};
use crate::wallet::WalletService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub recorder: Arc<LedgerRecorder>,
    pub escrows: EscrowLifecycleManager,
    pub distributions: DistributionOrchestrator,
    pub refresh: AccrualRefreshJob,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        wallet: Arc<dyn WalletService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let recorder = Arc::new(LedgerRecorder::new(repo.clone()));
        let escrows = EscrowLifecycleManager::new(repo.clone(), wallet.clone(), recorder.clone());
        let distributions = DistributionOrchestrator::new(
            repo.clone(),
            wallet,
            recorder.clone(),
            ForfeitureDistributor::new(config.forfeiture),
            notifier,
            config.distribution_lease_ms,
        );
        let refresh = AccrualRefreshJob::new(repo.clone(), config.stake_max_value);
        Self {
            repo,
            config,
            recorder,
            escrows,
            distributions,
            refresh,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/stakes", post(stakes::create_stake))
        .route("/v1/stakes/:id", get(stakes::get_stake))
        .route("/v1/stakes/:id/accrual", get(stakes::get_accrual))
        .route("/v1/stakes/:id/fees", get(stakes::get_fees))
        .route("/v1/stakes/:id/liquidate", post(stakes::liquidate_stake))
        .route("/v1/accruals/refresh", post(stakes::refresh_accruals))
        .route("/v1/goals/:id/escrow", get(goals::get_escrow))
        .route("/v1/goals/:id/outcome", post(goals::record_outcome))
        .route("/v1/goals/:id/disputes", post(goals::open_dispute))
        .route("/v1/disputes/:id/resolve", post(goals::resolve_dispute))
        .route("/v1/goals/:id/distribute", post(goals::distribute))
        .route("/v1/accounts/:id/balance", get(accounts::get_balance))
        .layer(cors)
        .with_state(state)
}
