//! services/scheduler/src/bin/scheduler.rs

use scheduler_core::TickOrchestrator;
use scheduler_lib::{
    app::{build_context, init_tracing},
    config::Config,
    error::ApiError,
    web::{router, state::AppState},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    init_tracing(config.log_level);
    info!("Configuration loaded. Starting scheduler...");

    // --- 2. Connect Adapters ---
    let ctx = build_context(&config).await?;

    // --- 3. Build the Shared AppState and Router ---
    let app_state = Arc::new(AppState::new(
        TickOrchestrator::new(ctx),
        config.cron_secret.clone(),
    ));
    let app = router(app_state);

    // --- 4. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
