//! services/scheduler/src/bin/run_once.rs
//!
//! Runs exactly one scheduler tick and prints the report as JSON, for hosts
//! that drive the scheduler from an external cron instead of HTTP.

use chrono::Utc;
use scheduler_core::TickOrchestrator;
use scheduler_lib::{
    app::{build_context, init_tracing},
    config::Config,
    error::ApiError,
};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    init_tracing(config.log_level);

    let orchestrator = TickOrchestrator::new(build_context(&config).await?);
    let report = orchestrator.run_tick(Utc::now()).await;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| ApiError::Internal(format!("Failed to encode report: {}", e)))?;
    println!("{}", json);
    Ok(())
}
