//! In-memory implementations of every port, for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::context::SchedulerContext;
use crate::domain::*;
use crate::ports::{JobStore, MessagingService, PortError, PortResult, TextGenerationService};

#[derive(Default)]
pub struct StoreState {
    pub reminders: Vec<ReminderTask>,
    pub jobs: Vec<ScheduledAction>,
    pub job_errors: HashMap<Uuid, String>,
    pub contacts: HashMap<Uuid, Contact>,
    pub preferences: Vec<UserContactPreference>,
    pub tasks: HashMap<Uuid, Vec<TaskSummaryRow>>,
    pub created_tasks: Vec<(Uuid, NewTask)>,
    pub sessions: Vec<SilentSession>,
    pub end_reasons: HashMap<Uuid, String>,
    pub logs: Vec<ActionLogEntry>,
    pub fail_reads: bool,
    pub fail_logs: bool,
    pub fail_task_creation: bool,
    pub fail_patches: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_contact(&self, user_id: Uuid, phone: &str, timezone: &str) {
        self.with(|s| {
            s.contacts.insert(
                user_id,
                Contact {
                    user_id,
                    phone: phone.to_string(),
                    timezone: timezone.to_string(),
                },
            )
        });
    }

    pub fn add_job(&self, job: ScheduledAction) {
        self.with(|s| s.jobs.push(job));
    }

    pub fn job(&self, id: Uuid) -> ScheduledAction {
        self.with(|s| s.jobs.iter().find(|j| j.id == id).cloned().unwrap())
    }

    pub fn logs(&self) -> Vec<ActionLogEntry> {
        self.with(|s| s.logs.clone())
    }

    pub fn active_sessions(&self, user_id: Uuid) -> usize {
        self.with(|s| {
            s.sessions
                .iter()
                .filter(|x| x.user_id == user_id && x.status == SessionStatus::Active)
                .count()
        })
    }

    fn read_guard(&self) -> PortResult<()> {
        if self.with(|s| s.fail_reads) {
            Err(PortError::Store("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn due_reminders(&self, now: DateTime<Utc>) -> PortResult<Vec<ReminderTask>> {
        self.read_guard()?;
        Ok(self.with(|s| {
            s.reminders
                .iter()
                .filter(|r| r.reminder_at <= now && !r.reminder_sent)
                .cloned()
                .collect()
        }))
    }

    async fn mark_reminder_sent(&self, reminder_id: Uuid) -> PortResult<()> {
        self.with(|s| {
            s.reminders
                .iter_mut()
                .filter(|r| r.id == reminder_id)
                .for_each(|r| r.reminder_sent = true)
        });
        Ok(())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> PortResult<Vec<ScheduledAction>> {
        self.read_guard()?;
        Ok(self.with(|s| {
            s.jobs
                .iter()
                .filter(|j| j.status == JobStatus::Active && j.next_run_at <= now)
                .cloned()
                .collect()
        }))
    }

    async fn patch_job(&self, job_id: Uuid, patch: JobPatch) -> PortResult<()> {
        self.with(|s| {
            if s.fail_patches.contains(&job_id) {
                return Err(PortError::Store("patch rejected".to_string()));
            }
            let job = s
                .jobs
                .iter_mut()
                .find(|j| j.id == job_id)
                .ok_or_else(|| PortError::NotFound(job_id.to_string()))?;
            if let Some(status) = patch.status {
                job.status = status;
            }
            if let Some(next) = patch.next_run_at {
                job.next_run_at = next;
            }
            if let Some(last) = patch.last_run_at {
                job.last_run_at = Some(last);
            }
            if let Some(error) = patch.error_message {
                s.job_errors.insert(job_id, error);
            }
            Ok(())
        })
    }

    async fn contact_for_user(&self, user_id: Uuid) -> PortResult<Option<Contact>> {
        self.read_guard()?;
        Ok(self.with(|s| s.contacts.get(&user_id).cloned()))
    }

    async fn task_context(&self, user_id: Uuid) -> PortResult<Vec<TaskSummaryRow>> {
        self.read_guard()?;
        Ok(self.with(|s| s.tasks.get(&user_id).cloned().unwrap_or_default()))
    }

    async fn create_task(&self, user_id: Uuid, task: &NewTask) -> PortResult<Option<Task>> {
        self.with(|s| {
            if s.fail_task_creation {
                return Ok(None);
            }
            s.created_tasks.push((user_id, task.clone()));
            Ok(Some(Task {
                id: Uuid::new_v4(),
                user_id,
                title: task.title.clone(),
                status: NEW_TASK_STATUS.to_string(),
            }))
        })
    }

    async fn auto_silent_preferences(&self) -> PortResult<Vec<UserContactPreference>> {
        self.read_guard()?;
        Ok(self.with(|s| {
            s.preferences
                .iter()
                .filter(|p| p.auto_silent_enabled)
                .cloned()
                .collect()
        }))
    }

    async fn active_silent_session(&self, user_id: Uuid) -> PortResult<Option<SilentSession>> {
        self.read_guard()?;
        Ok(self.with(|s| {
            s.sessions
                .iter()
                .find(|x| x.user_id == user_id && x.status == SessionStatus::Active)
                .cloned()
        }))
    }

    async fn expired_silent_sessions(&self, now: DateTime<Utc>) -> PortResult<Vec<SilentSession>> {
        self.read_guard()?;
        Ok(self.with(|s| s.sessions.iter().filter(|x| x.is_expired(now)).cloned().collect()))
    }

    async fn create_silent_session(
        &self,
        user_id: Uuid,
        duration_minutes: i64,
        trigger: SessionTrigger,
    ) -> PortResult<SilentSession> {
        self.with(|s| {
            if s
                .sessions
                .iter()
                .any(|x| x.user_id == user_id && x.status == SessionStatus::Active)
            {
                return Err(PortError::Store("duplicate active session".to_string()));
            }
            let session = SilentSession {
                id: Uuid::new_v4(),
                user_id,
                started_at: Utc::now(),
                duration_minutes,
                trigger,
                status: SessionStatus::Active,
                actions: Vec::new(),
            };
            s.sessions.push(session.clone());
            Ok(session)
        })
    }

    async fn end_silent_session(&self, session_id: Uuid, reason: &str) -> PortResult<SilentSession> {
        self.with(|s| {
            let session = s
                .sessions
                .iter_mut()
                .find(|x| x.id == session_id && x.status == SessionStatus::Active)
                .ok_or_else(|| PortError::NotFound(session_id.to_string()))?;
            session.status = SessionStatus::Ended;
            let ended = session.clone();
            s.end_reasons.insert(session_id, reason.to_string());
            Ok(ended)
        })
    }

    async fn record_silent_action(&self, session_id: Uuid, action: SilentAction) -> PortResult<()> {
        self.with(|s| {
            let session = s
                .sessions
                .iter_mut()
                .find(|x| x.id == session_id)
                .ok_or_else(|| PortError::NotFound(session_id.to_string()))?;
            session.actions.push(action);
            Ok(())
        })
    }

    async fn append_log(&self, entry: ActionLogEntry) -> PortResult<()> {
        self.with(|s| {
            if s.fail_logs {
                return Err(PortError::Store("log table unavailable".to_string()));
            }
            s.logs.push(entry);
            Ok(())
        })
    }
}

/// Records every message instead of sending it.
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
    pub accept: bool,
}

impl RecordingMessenger {
    pub fn new(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            accept,
        })
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingService for RecordingMessenger {
    async fn send(&self, phone: &str, text: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), text.to_string()));
        self.accept
    }
}

/// Answers every prompt with a fixed reply or error.
pub struct FakeGenerator {
    pub reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err("quota exceeded".to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerationService for FakeGenerator {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(PortError::Generation)
    }
}

pub fn context(
    store: &Arc<MemoryStore>,
    messenger: &Arc<RecordingMessenger>,
    generator: &Arc<FakeGenerator>,
) -> SchedulerContext {
    SchedulerContext::new(store.clone(), messenger.clone(), generator.clone())
}

pub fn job(
    user_id: Uuid,
    action_type: &str,
    payload: Value,
    schedule: Schedule,
    next_run_at: DateTime<Utc>,
) -> ScheduledAction {
    ScheduledAction {
        id: Uuid::new_v4(),
        user_id,
        action_type: action_type.to_string(),
        action: Action::decode(action_type, &payload),
        schedule,
        timezone: DEFAULT_TIMEZONE.to_string(),
        next_run_at,
        last_run_at: None,
        status: JobStatus::Active,
    }
}

pub fn row(title: &str, status: &str, due_date: Option<DateTime<Utc>>) -> TaskSummaryRow {
    TaskSummaryRow {
        title: title.to_string(),
        status: status.to_string(),
        due_date,
        category: None,
        completed_at: None,
    }
}
