//! services/scheduler/src/app.rs
//!
//! Start-up wiring shared by the binaries: logging, the database pool, and the
//! adapters behind each core port.

use async_openai::{config::OpenAIConfig, Client};
use scheduler_core::SchedulerContext;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::{DbAdapter, FonnteMessenger, OpenAiPromptAdapter};
use crate::config::Config;
use crate::error::ApiError;

/// Installs the global `tracing` subscriber.
pub fn init_tracing(level: Level) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connects to the database, runs migrations and builds every adapter.
pub async fn build_context(config: &Config) -> Result<SchedulerContext, ApiError> {
    // --- Database ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = DbAdapter::new(db_pool);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- Messaging Gateway ---
    let messenger = FonnteMessenger::new(
        config.fonnte_api_url.clone(),
        config.fonnte_token.clone(),
        config.messaging_timeout,
    )
    .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    // --- Text Generation ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let generator = OpenAiPromptAdapter::new(
        Client::with_config(openai_config),
        config.prompt_model.clone(),
    );

    Ok(SchedulerContext::new(
        Arc::new(db_adapter),
        Arc::new(messenger),
        Arc::new(generator),
    ))
}
