//! services/scheduler/src/web/middleware.rs
//!
//! Authentication middleware for the trigger endpoint.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::web::rest::ErrorResponse;
use crate::web::state::AppState;

/// Middleware that checks for `Authorization: Bearer <CRON_SECRET>`.
///
/// Anything else is rejected with 401 before the handler runs.
pub async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.cron_secret);

    if !authorized {
        warn!("Unauthorized attempt to trigger the scheduler");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("error", Some("Unauthorized"))),
        )
            .into_response();
    }
    next.run(req).await
}
