//! services/scheduler/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `JobStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Queries are checked at runtime so the crate builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::domain::{
    Action, ActionLogEntry, Contact, JobPatch, JobStatus, NewTask, ReminderTask, Schedule,
    ScheduledAction, SessionStatus, SessionTrigger, SilentAction, SilentSession, Task,
    TaskSummaryRow, UserContactPreference, DEFAULT_TIMEZONE, NEW_TASK_STATUS,
};
use scheduler_core::ports::{JobStore, PortError, PortResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const SESSION_COLUMNS: &str =
    "id, user_id, started_at, duration_minutes, trigger_type, status, actions";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `JobStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn store_error(e: sqlx::Error) -> PortError {
    PortError::Store(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReminderRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    reminder_at: DateTime<Utc>,
}
impl ReminderRecord {
    fn to_domain(self) -> ReminderTask {
        ReminderTask {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            reminder_at: self.reminder_at,
            reminder_sent: false,
        }
    }
}

#[derive(FromRow)]
struct ScheduledActionRecord {
    id: Uuid,
    user_id: Uuid,
    action_type: String,
    action_payload: Value,
    schedule_type: String,
    schedule_value: Option<String>,
    timezone: String,
    next_run_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
    status: String,
}
impl ScheduledActionRecord {
    /// Decodes the payload here so handlers only ever see a typed `Action`.
    fn to_domain(self) -> PortResult<ScheduledAction> {
        let status = self.status.parse::<JobStatus>().map_err(PortError::Unexpected)?;
        let timezone = if self.timezone.trim().is_empty() {
            DEFAULT_TIMEZONE.to_string()
        } else {
            self.timezone
        };
        // An unusable schedule fails the job the same way a bad payload does;
        // the one-off placeholder is never rescheduled.
        let (action, schedule) =
            match Schedule::from_parts(&self.schedule_type, self.schedule_value.as_deref()) {
                Ok(schedule) => (Action::decode(&self.action_type, &self.action_payload), schedule),
                Err(e) => (Err(e), Schedule::OneTime),
            };
        Ok(ScheduledAction {
            id: self.id,
            user_id: self.user_id,
            action,
            action_type: self.action_type,
            schedule,
            timezone,
            next_run_at: self.next_run_at,
            last_run_at: self.last_run_at,
            status,
        })
    }
}

#[derive(FromRow)]
struct ContactRecord {
    user_id: Uuid,
    phone: String,
    timezone: String,
}
impl ContactRecord {
    fn to_domain(self) -> Contact {
        Contact {
            user_id: self.user_id,
            phone: self.phone,
            timezone: self.timezone,
        }
    }
}

#[derive(FromRow)]
struct PreferenceRecord {
    user_id: Uuid,
    phone: String,
    timezone: String,
    auto_silent_enabled: bool,
    auto_silent_start_hour: i32,
    auto_silent_end_hour: i32,
}
impl PreferenceRecord {
    fn to_domain(self) -> UserContactPreference {
        UserContactPreference {
            user_id: self.user_id,
            phone: self.phone,
            timezone: self.timezone,
            auto_silent_enabled: self.auto_silent_enabled,
            auto_silent_start_hour: self.auto_silent_start_hour.rem_euclid(24) as u32,
            auto_silent_end_hour: self.auto_silent_end_hour.rem_euclid(24) as u32,
        }
    }
}

#[derive(FromRow)]
struct TaskSummaryRecord {
    title: String,
    status: String,
    due_date: Option<DateTime<Utc>>,
    category: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}
impl TaskSummaryRecord {
    fn to_domain(self) -> TaskSummaryRow {
        TaskSummaryRow {
            title: self.title,
            status: self.status,
            due_date: self.due_date,
            category: self.category,
            completed_at: self.completed_at,
        }
    }
}

#[derive(FromRow)]
struct TaskRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    status: String,
}
impl TaskRecord {
    fn to_domain(self) -> Task {
        Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            status: self.status,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    duration_minutes: i32,
    trigger_type: String,
    status: String,
    actions: Json<Vec<SilentAction>>,
}
impl SessionRecord {
    fn to_domain(self) -> SilentSession {
        SilentSession {
            id: self.id,
            user_id: self.user_id,
            started_at: self.started_at,
            duration_minutes: i64::from(self.duration_minutes),
            trigger: match self.trigger_type.as_str() {
                "auto" => SessionTrigger::Auto,
                _ => SessionTrigger::Manual,
            },
            status: match self.status.as_str() {
                "active" => SessionStatus::Active,
                _ => SessionStatus::Ended,
            },
            actions: self.actions.0,
        }
    }
}

//=========================================================================================
// `JobStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl JobStore for DbAdapter {
    async fn due_reminders(&self, now: DateTime<Utc>) -> PortResult<Vec<ReminderTask>> {
        let records = sqlx::query_as::<_, ReminderRecord>(
            "SELECT id, user_id, title, reminder_at FROM tasks \
             WHERE reminder_at <= $1 AND reminder_sent = FALSE \
             ORDER BY reminder_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(ReminderRecord::to_domain).collect())
    }

    async fn mark_reminder_sent(&self, reminder_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE tasks SET reminder_sent = TRUE WHERE id = $1")
            .bind(reminder_id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> PortResult<Vec<ScheduledAction>> {
        let records = sqlx::query_as::<_, ScheduledActionRecord>(
            "SELECT id, user_id, action_type, action_payload, schedule_type, schedule_value, \
                    timezone, next_run_at, last_run_at, status \
             FROM scheduled_actions \
             WHERE next_run_at <= $1 AND status = 'active' \
             ORDER BY next_run_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let id = record.id;
                record
                    .to_domain()
                    .map_err(|e| warn!(job_id = %id, "Skipping unreadable scheduled action: {}", e))
                    .ok()
            })
            .collect())
    }

    async fn patch_job(&self, job_id: Uuid, patch: JobPatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE scheduled_actions SET \
                status = COALESCE($2, status), \
                next_run_at = COALESCE($3, next_run_at), \
                last_run_at = COALESCE($4, last_run_at), \
                error_message = COALESCE($5, error_message) \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.next_run_at)
        .bind(patch.last_run_at)
        .bind(patch.error_message)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Scheduled action {} not found", job_id)));
        }
        Ok(())
    }

    async fn contact_for_user(&self, user_id: Uuid) -> PortResult<Option<Contact>> {
        let record = sqlx::query_as::<_, ContactRecord>(
            "SELECT user_id, phone, timezone FROM user_whatsapp WHERE user_id = $1 LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(record.map(ContactRecord::to_domain))
    }

    async fn task_context(&self, user_id: Uuid) -> PortResult<Vec<TaskSummaryRow>> {
        let records = sqlx::query_as::<_, TaskSummaryRecord>(
            "SELECT title, status, due_date, category, completed_at FROM tasks \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT 100",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(TaskSummaryRecord::to_domain).collect())
    }

    async fn create_task(&self, user_id: Uuid, task: &NewTask) -> PortResult<Option<Task>> {
        let record = sqlx::query_as::<_, TaskRecord>(
            "INSERT INTO tasks (user_id, title, description, notes, category, priority, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, user_id, title, status",
        )
        .bind(user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.notes)
        .bind(&task.category)
        .bind(&task.priority)
        .bind(NEW_TASK_STATUS)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(record.map(TaskRecord::to_domain))
    }

    async fn auto_silent_preferences(&self) -> PortResult<Vec<UserContactPreference>> {
        let records = sqlx::query_as::<_, PreferenceRecord>(
            "SELECT user_id, phone, timezone, auto_silent_enabled, \
                    auto_silent_start_hour, auto_silent_end_hour \
             FROM user_whatsapp WHERE auto_silent_enabled = TRUE",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(PreferenceRecord::to_domain).collect())
    }

    async fn active_silent_session(&self, user_id: Uuid) -> PortResult<Option<SilentSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM silent_sessions \
             WHERE user_id = $1 AND status = 'active' LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(record.map(SessionRecord::to_domain))
    }

    async fn expired_silent_sessions(&self, now: DateTime<Utc>) -> PortResult<Vec<SilentSession>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM silent_sessions \
             WHERE status = 'active' \
               AND started_at + make_interval(mins => duration_minutes) <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(records.into_iter().map(SessionRecord::to_domain).collect())
    }

    async fn create_silent_session(
        &self,
        user_id: Uuid,
        duration_minutes: i64,
        trigger: SessionTrigger,
    ) -> PortResult<SilentSession> {
        let minutes = i32::try_from(duration_minutes).map_err(|_| {
            PortError::Unexpected(format!("Session duration {} is out of range", duration_minutes))
        })?;
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO silent_sessions (user_id, duration_minutes, trigger_type) \
             VALUES ($1, $2, $3) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(minutes)
        .bind(trigger.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|d| d.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if duplicate {
                PortError::Store(format!("User {} already has an active silent session", user_id))
            } else {
                store_error(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn end_silent_session(&self, session_id: Uuid, reason: &str) -> PortResult<SilentSession> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE silent_sessions SET status = 'ended', ended_at = NOW(), end_reason = $2 \
             WHERE id = $1 AND status = 'active' RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        record
            .map(SessionRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Active silent session {} not found", session_id)))
    }

    async fn record_silent_action(&self, session_id: Uuid, action: SilentAction) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE silent_sessions SET actions = actions || $2 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(session_id)
        .bind(Json(vec![action]))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Active silent session {} not found", session_id)));
        }
        Ok(())
    }

    async fn append_log(&self, entry: ActionLogEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO action_logs (user_id, session_id, action_type, entity_type, entity_id, \
                                      details, user_input, success, error_message, \
                                      execution_time_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.user_id)
        .bind(entry.session_id)
        .bind(&entry.action_type)
        .bind(entry.entity_type.to_string())
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(&entry.user_input)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.execution_time_ms)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}
