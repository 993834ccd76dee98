//! crates/scheduler_core/src/dispatcher.rs
//!
//! The action dispatcher: executes one scheduled action by routing its
//! decoded `Action` to a handler. Every attempt, whatever its outcome, goes
//! through the audit trail before the caller reschedules the job.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditSubject, AuditTrail, Outcome};
use crate::context::SchedulerContext;
use crate::delivery::{Delivery, Notifier};
use crate::domain::{
    Action, ActionError, Contact, EntityType, NewTask, ScheduledAction, TaskSummaryRow,
};
use crate::messages;
use crate::ports::{JobStore, TextGenerationService};
use crate::recurrence::parse_timezone;

pub struct ActionDispatcher {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn TextGenerationService>,
    notifier: Notifier,
    audit: AuditTrail,
}

impl ActionDispatcher {
    pub fn new(ctx: &SchedulerContext, audit: AuditTrail) -> Self {
        Self {
            store: ctx.store.clone(),
            generator: ctx.generator.clone(),
            notifier: Notifier::new(ctx.store.clone(), ctx.messenger.clone()),
            audit,
        }
    }

    /// Executes `job` and logs the attempt.
    pub async fn dispatch(&self, job: &ScheduledAction, now: DateTime<Utc>) -> Outcome {
        let mut subject = AuditSubject::new(
            job.user_id,
            job.action_type.clone(),
            EntityType::ScheduledAction,
            job.id,
        );
        if let Ok(Action::ExecutePrompt {
            prompt: Some(prompt),
        }) = &job.action
        {
            subject = subject.with_user_input(prompt.clone());
        }
        self.audit.audited(subject, self.execute(job, now)).await
    }

    async fn execute(&self, job: &ScheduledAction, now: DateTime<Utc>) -> Outcome {
        let action = match &job.action {
            Ok(action) => action,
            Err(e) => {
                warn!(job_id = %job.id, "Cannot execute job: {}", e);
                return Outcome::failed(e.clone(), None, json!({ "schedule_type": job.schedule.kind() }));
            }
        };

        match action {
            Action::SendNotification { message } => self.send_notification(job, message).await,
            Action::CreateTask(task) => self.create_task(job, task).await,
            Action::SummarizeTasks => self.summarize_tasks(job).await,
            Action::TaskForDay => self.task_for_day(job, now).await,
            Action::SummaryOfDay => self.summary_of_day(job, now).await,
            Action::ExecutePrompt { prompt } => self.execute_prompt(job, prompt.as_deref()).await,
        }
    }

    //=====================================================================================
    // Handlers
    //=====================================================================================

    async fn send_notification(&self, job: &ScheduledAction, message: &str) -> Outcome {
        let Some(contact) = self.contact(job.user_id).await else {
            return missing_contact();
        };
        let text = messages::reminder(message);
        self.deliver(job, &contact, "send_notification", text).await
    }

    async fn create_task(&self, job: &ScheduledAction, task: &NewTask) -> Outcome {
        // A missing contact only means no confirmation is sent.
        let contact = self.contact(job.user_id).await;

        let created = match self.store.create_task(job.user_id, task).await {
            Ok(Some(created)) => created,
            Ok(None) => return self.task_creation_failed(job, contact, ActionError::TaskNotCreated).await,
            Err(e) => {
                return self
                    .task_creation_failed(job, contact, ActionError::Port(e.to_string()))
                    .await
            }
        };
        info!(job_id = %job.id, task_id = %created.id, "Created scheduled task '{}'", created.title);

        let details = json!({ "task_id": created.id, "title": created.title });
        match contact {
            Some(contact) => {
                let text = messages::task_created(&created.title);
                let delivery = self
                    .notifier
                    .deliver(job.user_id, &contact.phone, "create_task", &text)
                    .await;
                let mut outcome = Outcome::succeeded(Some(text), details);
                outcome.details["delivery"] = json!(delivery.as_str());
                outcome
            }
            None => Outcome::succeeded(None, details),
        }
    }

    async fn task_creation_failed(
        &self,
        job: &ScheduledAction,
        contact: Option<Contact>,
        error: ActionError,
    ) -> Outcome {
        warn!(job_id = %job.id, user_id = %job.user_id, "Failed to create scheduled task: {}", error);
        let Some(contact) = contact else {
            return Outcome::failed(error, None, json!({}));
        };
        let text = messages::TASK_CREATION_FAILED.to_string();
        let delivery = self
            .notifier
            .deliver(job.user_id, &contact.phone, "create_task", &text)
            .await;
        Outcome::failed(error, Some(text), json!({ "delivery": delivery.as_str() }))
    }

    async fn summarize_tasks(&self, job: &ScheduledAction) -> Outcome {
        let Some(contact) = self.contact(job.user_id).await else {
            return missing_contact();
        };
        let rows = self.task_context(job.user_id).await;
        let open: Vec<&str> = rows
            .iter()
            .filter(|r| !r.is_done())
            .map(|r| r.title.as_str())
            .collect();
        let done = rows.len() - open.len();
        let text = messages::open_tasks_summary(&open, done);
        self.deliver(job, &contact, "summarize_tasks", text).await
    }

    async fn task_for_day(&self, job: &ScheduledAction, now: DateTime<Utc>) -> Outcome {
        let Some(contact) = self.contact(job.user_id).await else {
            return missing_contact();
        };
        let tz = job_timezone(job, &contact);
        let today = now.with_timezone(&tz).date_naive();
        let rows = self.task_context(job.user_id).await;
        let due_today: Vec<&str> = rows
            .iter()
            .filter(|r| !r.is_done() && on_day(r.due_date, today, tz))
            .map(|r| r.title.as_str())
            .collect();
        let text = messages::tasks_for_today(&due_today);
        self.deliver(job, &contact, "task_for_day", text).await
    }

    async fn summary_of_day(&self, job: &ScheduledAction, now: DateTime<Utc>) -> Outcome {
        let Some(contact) = self.contact(job.user_id).await else {
            return missing_contact();
        };
        let tz = job_timezone(job, &contact);
        let today = now.with_timezone(&tz).date_naive();
        let rows = self.task_context(job.user_id).await;
        let completed_today: Vec<&str> = rows
            .iter()
            .filter(|r| r.is_done() && on_day(r.completed_at, today, tz))
            .map(|r| r.title.as_str())
            .collect();
        let still_open = rows
            .iter()
            .filter(|r| !r.is_done() && on_day(r.due_date, today, tz))
            .count();
        let text = messages::day_summary(&completed_today, still_open);
        self.deliver(job, &contact, "summary_of_day", text).await
    }

    async fn execute_prompt(&self, job: &ScheduledAction, prompt: Option<&str>) -> Outcome {
        let Some(contact) = self.contact(job.user_id).await else {
            return missing_contact();
        };
        let Some(prompt) = prompt else {
            warn!(job_id = %job.id, "Execute prompt failed: no prompt in payload");
            return Outcome::failed(ActionError::MissingPrompt, None, json!({}));
        };

        info!(job_id = %job.id, user_id = %job.user_id, "Executing AI prompt");
        match self.generator.generate(prompt).await {
            Ok(reply) => {
                let text = messages::prompt_response(&reply);
                self.deliver(job, &contact, "execute_prompt", text).await
            }
            Err(e) => {
                warn!(job_id = %job.id, "AI prompt execution failed: {}", e);
                let text = messages::PROMPT_FAILED.to_string();
                let mut outcome = self.deliver(job, &contact, "execute_prompt", text).await;
                outcome.details["ai_error"] = json!(e.to_string());
                outcome
            }
        }
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    async fn deliver(&self, job: &ScheduledAction, contact: &Contact, kind: &str, text: String) -> Outcome {
        let delivery = self
            .notifier
            .deliver(job.user_id, &contact.phone, kind, &text)
            .await;
        if delivery == Delivery::Failed {
            warn!(job_id = %job.id, "Gateway did not accept the message");
        }
        Outcome::succeeded(Some(text), json!({ "delivery": delivery.as_str() }))
    }

    async fn contact(&self, user_id: Uuid) -> Option<Contact> {
        match self.store.contact_for_user(user_id).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(user_id = %user_id, "Failed to fetch contact: {}", e);
                None
            }
        }
    }

    async fn task_context(&self, user_id: Uuid) -> Vec<TaskSummaryRow> {
        self.store.task_context(user_id).await.unwrap_or_else(|e| {
            warn!(user_id = %user_id, "Failed to fetch task context: {}", e);
            Vec::new()
        })
    }
}

fn missing_contact() -> Outcome {
    Outcome::failed(ActionError::MissingContact, None, json!({}))
}

/// The job's own timezone, then the user's, then UTC.
fn job_timezone(job: &ScheduledAction, contact: &Contact) -> Tz {
    parse_timezone(&job.timezone)
        .or_else(|_| parse_timezone(&contact.timezone))
        .unwrap_or(Tz::UTC)
}

fn on_day(instant: Option<DateTime<Utc>>, day: NaiveDate, tz: Tz) -> bool {
    instant.is_some_and(|at| at.with_timezone(&tz).date_naive() == day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Schedule, SessionTrigger};
    use crate::testing::{context, job, row, FakeGenerator, MemoryStore, RecordingMessenger};
    use chrono::{Duration, TimeZone};

    fn dispatcher(
        store: &Arc<MemoryStore>,
        messenger: &Arc<RecordingMessenger>,
        generator: &Arc<FakeGenerator>,
    ) -> ActionDispatcher {
        let ctx = context(store, messenger, generator);
        ActionDispatcher::new(&ctx, AuditTrail::new(ctx.store.clone(), Uuid::new_v4()))
    }

    #[tokio::test]
    async fn create_task_without_contact_still_succeeds() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        let job = job(user, "create_task", json!({ "title": "Buy milk" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(outcome.success);
        assert!(outcome.notify_text.is_none());
        assert!(messenger.sent().is_empty());
        let created = store.with(|s| s.created_tasks.clone());
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].1.category, "scheduled");
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].success);
        assert_eq!(logs[0].action_type, "create_task");
    }

    #[tokio::test]
    async fn notify_without_contact_fails_without_sending() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let job = job(Uuid::new_v4(), "send_notification", json!({ "message": "Hi" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ActionError::MissingContact));
        assert!(messenger.sent().is_empty());
        assert!(!store.logs()[0].success);
    }

    #[tokio::test]
    async fn notify_sends_reminder_copy_even_if_gateway_rejects() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(false), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        let job = job(user, "send_notification", json!({ "message": "Stand up" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(outcome.success);
        assert_eq!(messenger.sent(), vec![("62811".to_string(), "🔔 Reminder: Stand up".to_string())]);
        assert_eq!(store.logs()[0].details["delivery"], "failed");
    }

    #[tokio::test]
    async fn unknown_action_type_is_a_logged_failure() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let job = job(Uuid::new_v4(), "launch_rocket", json!({}), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert_eq!(outcome.error, Some(ActionError::UnknownActionType("launch_rocket".to_string())));
        let logs = store.logs();
        assert_eq!(logs[0].action_type, "launch_rocket");
        assert_eq!(logs[0].error_message.as_deref(), Some("Unknown action type: launch_rocket"));
    }

    #[tokio::test]
    async fn missing_prompt_never_calls_the_model() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        let job = job(user, "execute_prompt", json!({}), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert_eq!(outcome.error, Some(ActionError::MissingPrompt));
        assert_eq!(generator.calls(), 0);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn model_failure_becomes_an_apology() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::failing());
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        let job = job(user, "execute_prompt", json!({ "prompt": "Motivate me" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(outcome.success);
        assert_eq!(messenger.sent()[0].1, messages::PROMPT_FAILED);
        let log = &store.logs()[0];
        assert_eq!(log.user_input.as_deref(), Some("Motivate me"));
        assert!(log.details["ai_error"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn prompt_reply_is_forwarded() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("Keep going!"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        let job = job(user, "execute_prompt", json!({ "prompt": "Motivate me" }), Schedule::OneTime, Utc::now());

        dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert_eq!(
            messenger.sent()[0].1,
            "🤖 Here is your scheduled AI response:\n\nKeep going!"
        );
    }

    #[tokio::test]
    async fn task_for_day_uses_the_local_calendar_day() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "Asia/Jakarta");
        // 2024-01-02 06:00 in Jakarta.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        store.with(|s| {
            s.tasks.insert(
                user,
                vec![
                    row("Local today", "todo", Some(now + Duration::hours(3))),
                    row("UTC today only", "todo", Some(now - Duration::hours(8))),
                    row("Already done", "done", Some(now + Duration::hours(1))),
                ],
            )
        });
        let mut job = job(user, "task_for_day", json!({}), Schedule::OneTime, now);
        job.timezone = "Asia/Jakarta".to_string();

        dispatcher(&store, &messenger, &generator).dispatch(&job, now).await;

        let text = &messenger.sent()[0].1;
        assert!(text.contains("1 task for today"));
        assert!(text.contains("1. Local today"));
        assert!(!text.contains("UTC today only"));
    }

    #[tokio::test]
    async fn six_due_tasks_are_capped_at_five() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        store.with(|s| {
            s.tasks.insert(
                user,
                (1..=6)
                    .map(|i| row(&format!("Task {}", i), "todo", Some(now + Duration::hours(i))))
                    .collect(),
            )
        });
        let job = job(user, "task_for_day", json!({}), Schedule::OneTime, now);

        dispatcher(&store, &messenger, &generator).dispatch(&job, now).await;

        let text = &messenger.sent()[0].1;
        assert!(text.contains("5. Task 5"));
        assert!(!text.contains("Task 6"));
        assert!(text.contains("\n...and 1 more!"));
    }

    #[tokio::test]
    async fn task_creation_failure_is_reported_to_the_user() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        store.with(|s| s.fail_task_creation = true);
        let job = job(user, "create_task", json!({ "title": "Buy milk" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ActionError::TaskNotCreated));
        assert_eq!(
            messenger.sent(),
            vec![("62811".to_string(), messages::TASK_CREATION_FAILED.to_string())]
        );
        let logs = store.logs();
        assert!(!logs[0].success);
        assert_eq!(logs[0].error_message.as_deref(), Some("Task could not be created"));
        assert_eq!(logs[0].details["delivery"], "sent");
    }

    #[tokio::test]
    async fn task_creation_failure_without_contact_sends_nothing() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        store.with(|s| s.fail_task_creation = true);
        let job = job(Uuid::new_v4(), "create_task", json!({ "title": "Buy milk" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ActionError::TaskNotCreated));
        assert!(outcome.notify_text.is_none());
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn summary_of_day_counts_completions_on_the_local_day() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "Asia/Jakarta");
        // 2024-01-02 06:00 in Jakarta.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let done = |title: &str, at: DateTime<Utc>| {
            let mut finished = row(title, "done", None);
            finished.completed_at = Some(at);
            finished
        };
        store.with(|s| {
            s.tasks.insert(
                user,
                vec![
                    // 05:00 local on the 2nd.
                    done("Morning run", now - Duration::hours(1)),
                    // 22:00 local on the 1st: same UTC date, previous local day.
                    done("Yesterday's report", now - Duration::hours(8)),
                    row("Open today", "todo", Some(now + Duration::hours(3))),
                    row("Open next week", "todo", Some(now + Duration::days(7))),
                ],
            )
        });
        let mut job = job(user, "summary_of_day", json!({}), Schedule::OneTime, now);
        job.timezone = "Asia/Jakarta".to_string();

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, now).await;

        assert!(outcome.success);
        let text = &messenger.sent()[0].1;
        assert!(text.contains("you completed 1 task today"));
        assert!(text.contains("1. Morning run"));
        assert!(!text.contains("Yesterday's report"));
        assert!(text.ends_with("📌 Still open: 1"));
        assert_eq!(store.logs()[0].action_type, "summary_of_day");
    }

    #[tokio::test]
    async fn messages_are_held_during_silent_mode() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        store
            .create_silent_session(user, 60, SessionTrigger::Manual)
            .await
            .unwrap();
        let job = job(user, "send_notification", json!({ "message": "Later" }), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(outcome.success);
        assert!(messenger.sent().is_empty());
        let held = store.with(|s| s.sessions[0].actions.clone());
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].content, "🔔 Reminder: Later");
    }

    #[tokio::test]
    async fn log_failure_does_not_change_the_outcome() {
        let (store, messenger, generator) =
            (MemoryStore::new(), RecordingMessenger::new(true), FakeGenerator::replying("-"));
        let user = Uuid::new_v4();
        store.add_contact(user, "62811", "UTC");
        store.with(|s| s.fail_logs = true);
        let job = job(user, "summarize_tasks", json!({}), Schedule::OneTime, Utc::now());

        let outcome = dispatcher(&store, &messenger, &generator).dispatch(&job, Utc::now()).await;

        assert!(outcome.success);
        assert!(messenger.sent()[0].1.contains("no open tasks"));
    }
}
