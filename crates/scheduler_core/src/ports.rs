//! crates/scheduler_core/src/ports.rs
//!
//! Defines the service contracts (traits) the scheduling engine depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! engine independent of the database, the messaging gateway and the LLM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ActionLogEntry, Contact, JobPatch, NewTask, ReminderTask, ScheduledAction, SessionTrigger,
    SilentAction, SilentSession, Task, TaskSummaryRow, UserContactPreference,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Delivery error: {0}")]
    Delivery(String),
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Every read and write the engine performs against the persistent store.
#[async_trait]
pub trait JobStore: Send + Sync {
    // --- Reminders ---
    /// Reminders whose due instant is at or before `now` and not yet sent.
    async fn due_reminders(&self, now: DateTime<Utc>) -> PortResult<Vec<ReminderTask>>;

    async fn mark_reminder_sent(&self, reminder_id: Uuid) -> PortResult<()>;

    // --- Scheduled Actions ---
    /// Active jobs whose next run is at or before `now`.
    async fn due_jobs(&self, now: DateTime<Utc>) -> PortResult<Vec<ScheduledAction>>;

    async fn patch_job(&self, job_id: Uuid, patch: JobPatch) -> PortResult<()>;

    // --- Users and Tasks ---
    async fn contact_for_user(&self, user_id: Uuid) -> PortResult<Option<Contact>>;

    async fn task_context(&self, user_id: Uuid) -> PortResult<Vec<TaskSummaryRow>>;

    async fn create_task(&self, user_id: Uuid, task: &NewTask) -> PortResult<Option<Task>>;

    // --- Silent Sessions ---
    /// Users that have auto-silent mode switched on.
    async fn auto_silent_preferences(&self) -> PortResult<Vec<UserContactPreference>>;

    async fn active_silent_session(&self, user_id: Uuid) -> PortResult<Option<SilentSession>>;

    async fn expired_silent_sessions(&self, now: DateTime<Utc>) -> PortResult<Vec<SilentSession>>;

    async fn create_silent_session(
        &self,
        user_id: Uuid,
        duration_minutes: i64,
        trigger: SessionTrigger,
    ) -> PortResult<SilentSession>;

    async fn end_silent_session(&self, session_id: Uuid, reason: &str) -> PortResult<SilentSession>;

    async fn record_silent_action(&self, session_id: Uuid, action: SilentAction) -> PortResult<()>;

    // --- Audit ---
    async fn append_log(&self, entry: ActionLogEntry) -> PortResult<()>;
}

#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Sends a text message. Returns `true` only when the gateway accepted it;
    /// transport and application failures both yield `false`.
    async fn send(&self, phone: &str, text: &str) -> bool;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Generates a reply to a free-form prompt.
    async fn generate(&self, prompt: &str) -> PortResult<String>;
}
