//! services/scheduler/src/web/rest.rs
//!
//! Contains the Axum handler for the scheduler trigger and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use scheduler_core::TickReport;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        run_scheduler_handler,
    ),
    components(
        schemas(RunResponse, ErrorResponse)
    ),
    modifiers(&CronSecretAddon),
    tags(
        (name = "Scheduler API", description = "Trigger for the reminder and scheduled-action sweeps.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme the trigger endpoint is guarded by.
struct CronSecretAddon;

impl Modify for CronSecretAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Response Structs
//=========================================================================================

/// Per-sweep counts of a completed tick.
#[derive(Debug, Serialize, ToSchema)]
pub struct RunResponse {
    status: String,
    reminders_sent: usize,
    actions_executed: usize,
    silent_sessions_activated: usize,
    silent_sessions_ended: usize,
}

impl From<TickReport> for RunResponse {
    fn from(report: TickReport) -> Self {
        Self {
            status: "success".to_string(),
            reminders_sent: report.reminders_sent,
            actions_executed: report.actions_executed,
            silent_sessions_activated: report.silent_sessions_activated,
            silent_sessions_ended: report.silent_sessions_ended,
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: &str, message: Option<&str>) -> Self {
        Self {
            status: status.to_string(),
            message: message.map(str::to_string),
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Run one scheduler tick.
///
/// Sends due reminders, executes due scheduled actions, and opens and closes
/// silent-mode windows. Requires `Authorization: Bearer <CRON_SECRET>`.
#[utoipa::path(
    post,
    path = "/run",
    responses(
        (status = 200, description = "Tick completed", body = RunResponse),
        (status = 401, description = "Missing or wrong bearer token", body = ErrorResponse),
        (status = 500, description = "The tick aborted unexpectedly", body = ErrorResponse)
    ),
    security(
        ("cron_secret" = [])
    )
)]
pub async fn run_scheduler_handler(State(app_state): State<Arc<AppState>>) -> Response {
    let tick_guard = app_state.tick_lock.clone().lock_owned().await;
    info!("--- CRON JOB TRIGGERED: running scheduler tick ---");

    // The spawned task owns the guard and outlives a dropped request. A panic
    // anywhere in the tick surfaces here as a JoinError.
    let orchestrator = app_state.orchestrator.clone();
    let tick = tokio::spawn(async move {
        let _tick_guard = tick_guard;
        orchestrator.run_tick(Utc::now()).await
    });
    match tick.await {
        Ok(report) => (StatusCode::OK, Json(RunResponse::from(report))).into_response(),
        Err(e) => {
            error!("Scheduler tick aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("internal_server_error", None)),
            )
                .into_response()
        }
    }
}
