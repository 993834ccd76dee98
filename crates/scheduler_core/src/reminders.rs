//! crates/scheduler_core/src/reminders.rs
//!
//! The one-time reminder sweep. A reminder is flagged as sent once a delivery
//! has been attempted, whether or not the gateway accepted it.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{AuditSubject, AuditTrail, Outcome};
use crate::context::SchedulerContext;
use crate::delivery::Notifier;
use crate::domain::{EntityType, ReminderTask};
use crate::messages;
use crate::ports::JobStore;

pub struct ReminderRunner {
    store: Arc<dyn JobStore>,
    notifier: Notifier,
    audit: AuditTrail,
}

impl ReminderRunner {
    pub fn new(ctx: &SchedulerContext, audit: AuditTrail) -> Self {
        Self {
            store: ctx.store.clone(),
            notifier: Notifier::new(ctx.store.clone(), ctx.messenger.clone()),
            audit,
        }
    }

    /// Processes every due reminder and returns how many were attempted.
    pub async fn run(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.due_reminders(now).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to query due reminders: {}", e);
                return 0;
            }
        };
        if due.is_empty() {
            info!("No due reminders found.");
            return 0;
        }

        info!("Found {} reminder(s) to send.", due.len());
        let mut attempted = 0;
        for reminder in &due {
            if self.process(reminder).await {
                attempted += 1;
            }
        }
        attempted
    }

    /// Returns `false` when the reminder was skipped for lack of a contact.
    async fn process(&self, reminder: &ReminderTask) -> bool {
        let contact = match self.store.contact_for_user(reminder.user_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                info!(
                    user_id = %reminder.user_id,
                    "Could not find phone number, skipping reminder {}", reminder.id
                );
                return false;
            }
            Err(e) => {
                warn!(reminder_id = %reminder.id, "Failed to fetch contact: {}", e);
                return false;
            }
        };

        let text = messages::reminder(&reminder.title);
        let subject = AuditSubject::new(reminder.user_id, "send_reminder", EntityType::Task, reminder.id);
        self.audit
            .audited(subject, async {
                let delivery = self
                    .notifier
                    .deliver(reminder.user_id, &contact.phone, "reminder", &text)
                    .await;
                info!(reminder_id = %reminder.id, "Reminder {}", delivery.as_str());
                Outcome::succeeded(
                    Some(text.clone()),
                    json!({ "title": reminder.title, "delivery": delivery.as_str() }),
                )
            })
            .await;

        if let Err(e) = self.store.mark_reminder_sent(reminder.id).await {
            error!(reminder_id = %reminder.id, "Failed to mark reminder as sent: {}", e);
        }
        true
    }
}
