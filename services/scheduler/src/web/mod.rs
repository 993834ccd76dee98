pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_cron_secret;
pub use rest::run_scheduler_handler;

use axum::{middleware as axum_middleware, routing::post, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the router with the trigger endpoint behind the bearer check.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(run_scheduler_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_cron_secret,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
