//! crates/scheduler_core/src/audit.rs
//!
//! Wraps every action attempt so that its outcome, duration and error are
//! written to the action log in one place. Log writes are best-effort: a
//! failing write is reported through `tracing` and never changes the outcome.

use chrono::Utc;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{ActionError, ActionLogEntry, EntityType};
use crate::ports::JobStore;

/// The result of one action attempt.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    /// The message composed for the user, if any.
    pub notify_text: Option<String>,
    pub error: Option<ActionError>,
    pub details: Value,
}

impl Outcome {
    pub fn succeeded(notify_text: Option<String>, details: Value) -> Self {
        Self {
            success: true,
            notify_text,
            error: None,
            details,
        }
    }

    pub fn failed(error: ActionError, notify_text: Option<String>, details: Value) -> Self {
        Self {
            success: false,
            notify_text,
            error: Some(error),
            details,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// What an attempt is about, as it appears in the log.
#[derive(Debug, Clone)]
pub struct AuditSubject {
    pub user_id: Uuid,
    pub action_type: String,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub user_input: Option<String>,
}

impl AuditSubject {
    pub fn new(
        user_id: Uuid,
        action_type: impl Into<String>,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Self {
        Self {
            user_id,
            action_type: action_type.into(),
            entity_type,
            entity_id: Some(entity_id),
            user_input: None,
        }
    }

    pub fn with_user_input(mut self, input: impl Into<String>) -> Self {
        self.user_input = Some(input.into());
        self
    }
}

/// Writes audit entries tagged with the trace id of the current tick.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn JobStore>,
    trace_id: Uuid,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn JobStore>, trace_id: Uuid) -> Self {
        Self { store, trace_id }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Runs `attempt`, logs its outcome with the elapsed time, and returns it.
    pub async fn audited<F>(&self, subject: AuditSubject, attempt: F) -> Outcome
    where
        F: Future<Output = Outcome>,
    {
        let started = Instant::now();
        let outcome = attempt.await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.record(subject, &outcome, Some(elapsed_ms)).await;
        outcome
    }

    /// Logs an outcome that was produced without going through `audited`.
    pub async fn record(&self, subject: AuditSubject, outcome: &Outcome, execution_time_ms: Option<i64>) {
        let mut details = outcome.details.clone();
        if let (Some(text), Value::Object(map)) = (&outcome.notify_text, &mut details) {
            map.entry("message").or_insert_with(|| json!(text));
        }

        let entry = ActionLogEntry {
            user_id: subject.user_id,
            session_id: self.trace_id,
            action_type: subject.action_type,
            entity_type: subject.entity_type,
            entity_id: subject.entity_id,
            details,
            user_input: subject.user_input,
            success: outcome.success,
            error_message: outcome.error_message(),
            execution_time_ms,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.append_log(entry).await {
            warn!(trace_id = %self.trace_id, "Failed to write action log entry: {}", e);
        }
    }
}
