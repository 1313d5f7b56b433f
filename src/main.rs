use anyhow::Context;
use goalstake::{api, config::Config, db::init_db, HttpWalletService, LogNotifier, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let wallet = Arc::new(HttpWalletService::new(config.wallet_api_url.clone()));
    let state = api::AppState::new(repo, config.clone(), wallet, Arc::new(LogNotifier));

    if config.accrual_refresh_interval_secs > 0 {
        let interval = Duration::from_secs(config.accrual_refresh_interval_secs);
        tokio::spawn(state.refresh.clone().run_periodic(interval));
        tracing::info!(interval_secs = config.accrual_refresh_interval_secs, "Accrual refresh scheduled");
    }

    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
