//! services/scheduler/src/web/state.rs
//!
//! Defines the application's shared state.

use scheduler_core::TickOrchestrator;
use std::sync::Arc;
use tokio::sync::Mutex;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub orchestrator: Arc<TickOrchestrator>,
    /// Expected bearer token on the trigger endpoint.
    pub cron_secret: String,
    /// Held by the running tick itself so overlapping triggers run
    /// back-to-back, even when a caller disconnects mid-tick.
    pub tick_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(orchestrator: TickOrchestrator, cron_secret: String) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            cron_secret,
            tick_lock: Arc::new(Mutex::new(())),
        }
    }
}
