//! services/scheduler/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// Shared secret expected as `Authorization: Bearer <secret>` on the trigger.
    pub cron_secret: String,
    pub fonnte_token: String,
    pub fonnte_api_url: String,
    pub messaging_timeout: Duration,
    pub openai_api_key: Option<String>,
    pub prompt_model: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;
        let db_max_connections = parse_number(&or_default("DB_MAX_CONNECTIONS", "5"), "DB_MAX_CONNECTIONS")?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Trigger Authentication ---
        let cron_secret = required("CRON_SECRET")?;

        // --- Messaging Gateway ---
        let fonnte_token = required("FONNTE_TOKEN")?;
        let fonnte_api_url = or_default("FONNTE_API_URL", "https://api.fonnte.com/send");
        let timeout_secs: u64 =
            parse_number(&or_default("MESSAGING_TIMEOUT_SECS", "15"), "MESSAGING_TIMEOUT_SECS")?;

        // --- Text Generation ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty());
        let prompt_model = or_default("PROMPT_MODEL", "gpt-4o-mini");

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            cron_secret,
            fonnte_token,
            fonnte_api_url,
            messaging_timeout: Duration::from_secs(timeout_secs),
            openai_api_key,
            prompt_model,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a number", raw)))
}
