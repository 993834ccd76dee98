//! crates/scheduler_core/src/domain.rs
//!
//! Defines the pure, core data structures of the scheduler.
//! These structs are independent of any database or wire format; adapters map
//! their own records into them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status given to every task the scheduler creates.
pub const NEW_TASK_STATUS: &str = "todo";

/// Timezone assumed when a job or user does not name one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

//=========================================================================================
// Reminders and Tasks
//=========================================================================================

/// A one-time reminder attached to a task.
#[derive(Debug, Clone)]
pub struct ReminderTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub reminder_at: DateTime<Utc>,
    pub reminder_sent: bool,
}

/// A task as returned by the store after the scheduler created it.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
}

/// The lean view of a task used to build summaries.
#[derive(Debug, Clone)]
pub struct TaskSummaryRow {
    pub title: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskSummaryRow {
    pub fn is_done(&self) -> bool {
        matches!(self.status.as_str(), "done" | "completed")
    }
}

/// The fields of a task to be created by a `create_task` action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_category() -> String {
    "scheduled".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

//=========================================================================================
// Users
//=========================================================================================

/// Where and in which timezone a user is reached.
#[derive(Debug, Clone)]
pub struct Contact {
    pub user_id: Uuid,
    pub phone: String,
    pub timezone: String,
}

/// Per-user delivery and silent-mode configuration.
#[derive(Debug, Clone)]
pub struct UserContactPreference {
    pub user_id: Uuid,
    pub phone: String,
    pub timezone: String,
    pub auto_silent_enabled: bool,
    pub auto_silent_start_hour: u32,
    pub auto_silent_end_hour: u32,
}

//=========================================================================================
// Scheduled Actions
//=========================================================================================

/// Lifecycle of a scheduled action. Only `Active` jobs are ever selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// How a job recurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    OneTime,
    Cron { expression: String },
}

impl Schedule {
    /// Builds a schedule from its stored kind and value.
    ///
    /// A `cron` row without a value keeps an empty expression so that the
    /// failure surfaces when the job is rescheduled.
    pub fn from_parts(kind: &str, value: Option<&str>) -> Result<Self, ActionError> {
        match kind {
            "one_time" => Ok(Schedule::OneTime),
            "cron" => Ok(Schedule::Cron {
                expression: value.unwrap_or_default().to_string(),
            }),
            other => Err(ActionError::UnknownScheduleType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::OneTime => "one_time",
            Schedule::Cron { .. } => "cron",
        }
    }
}

/// Why an action could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),
    #[error("Unknown schedule type: {0}")]
    UnknownScheduleType(String),
    #[error("Invalid payload for '{action_type}': {reason}")]
    InvalidPayload { action_type: String, reason: String },
    #[error("User phone not found")]
    MissingContact,
    #[error("No prompt in payload")]
    MissingPrompt,
    #[error("Task could not be created")]
    TaskNotCreated,
    /// The action ran but its next run could not be computed.
    #[error("{0}")]
    Reschedule(String),
    #[error("{0}")]
    Port(String),
}

/// The closed set of things a scheduled action can do, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendNotification { message: String },
    CreateTask(NewTask),
    SummarizeTasks,
    TaskForDay,
    SummaryOfDay,
    ExecutePrompt { prompt: Option<String> },
}

#[derive(Deserialize)]
struct NotificationPayload {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct PromptPayload {
    #[serde(default)]
    prompt: Option<String>,
}

impl Action {
    /// Decodes a stored action-type tag and its payload.
    pub fn decode(action_type: &str, payload: &Value) -> Result<Self, ActionError> {
        let payload = if payload.is_null() {
            Value::Object(Default::default())
        } else {
            payload.clone()
        };
        let invalid = |e: serde_json::Error| ActionError::InvalidPayload {
            action_type: action_type.to_string(),
            reason: e.to_string(),
        };

        match action_type {
            "send_notification" | "notify" => {
                let p: NotificationPayload = serde_json::from_value(payload).map_err(invalid)?;
                let message = p
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "You have a scheduled reminder.".to_string());
                Ok(Action::SendNotification { message })
            }
            "create_task" => Ok(Action::CreateTask(
                serde_json::from_value(payload).map_err(invalid)?,
            )),
            "summarize_tasks" => Ok(Action::SummarizeTasks),
            "task_for_day" => Ok(Action::TaskForDay),
            "summary_of_day" | "daily_summary" => Ok(Action::SummaryOfDay),
            "execute_prompt" | "run_prompt" => {
                let p: PromptPayload = serde_json::from_value(payload).map_err(invalid)?;
                Ok(Action::ExecutePrompt {
                    prompt: p.prompt.filter(|s| !s.trim().is_empty()),
                })
            }
            other => Err(ActionError::UnknownActionType(other.to_string())),
        }
    }

    /// The canonical tag written to the audit log.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::SendNotification { .. } => "send_notification",
            Action::CreateTask(_) => "create_task",
            Action::SummarizeTasks => "summarize_tasks",
            Action::TaskForDay => "task_for_day",
            Action::SummaryOfDay => "summary_of_day",
            Action::ExecutePrompt { .. } => "execute_prompt",
        }
    }
}

/// A unit of recurring or one-time automated work.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The tag as stored, kept for logging even when it does not decode.
    pub action_type: String,
    pub action: Result<Action, ActionError>,
    pub schedule: Schedule,
    pub timezone: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

/// A partial update of a scheduled action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobPatch {
    pub fn rescheduled(next_run_at: DateTime<Utc>, ran_at: DateTime<Utc>) -> Self {
        Self {
            next_run_at: Some(next_run_at),
            last_run_at: Some(ran_at),
            ..Default::default()
        }
    }

    pub fn completed(ran_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            last_run_at: Some(ran_at),
            ..Default::default()
        }
    }

    pub fn failed(ran_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            last_run_at: Some(ran_at),
            error_message: Some(reason.into()),
            ..Default::default()
        }
    }
}

//=========================================================================================
// Silent Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTrigger {
    Manual,
    Auto,
}

impl SessionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTrigger::Manual => "manual",
            SessionTrigger::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }
}

/// Something that happened while a silent session was active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilentAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub content: String,
}

/// A time-bounded suppression window for one user.
#[derive(Debug, Clone)]
pub struct SilentSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub trigger: SessionTrigger,
    pub status: SessionStatus,
    pub actions: Vec<SilentAction>,
}

impl SilentSession {
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(self.duration_minutes)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.ends_at() <= now
    }
}

//=========================================================================================
// Audit Log
//=========================================================================================

/// What kind of row an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Task,
    ScheduledAction,
    SilentSession,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityType::Task => "task",
            EntityType::ScheduledAction => "scheduled_action",
            EntityType::SilentSession => "silent_session",
        })
    }
}

/// An append-only record of one action attempt.
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    pub user_id: Uuid,
    /// Trace id of the tick that made the attempt.
    pub session_id: Uuid,
    pub action_type: String,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub details: Value,
    pub user_input: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Tick Report
//=========================================================================================

/// Per-sweep counts of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub reminders_sent: usize,
    pub actions_executed: usize,
    pub silent_sessions_activated: usize,
    pub silent_sessions_ended: usize,
}
