//! crates/scheduler_core/src/silent.rs
//!
//! Silent mode: opens auto-triggered sessions when a user's configured start
//! hour comes round on their local clock, and closes expired sessions with a
//! summary of what was held back.
//!
//! Activation is checked at hourly granularity, so the tick must run at least
//! once an hour for auto sessions to open.

use chrono::{DateTime, Timelike, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditSubject, AuditTrail, Outcome};
use crate::context::SchedulerContext;
use crate::delivery::Notifier;
use crate::domain::{EntityType, SessionTrigger, SilentSession, UserContactPreference};
use crate::messages;
use crate::ports::JobStore;
use crate::recurrence::{parse_timezone, window_duration_hours};

/// Reason recorded on sessions closed by the expiry sweep.
pub const EXPIRED_REASON: &str = "expired";

pub struct SilentModeManager {
    store: Arc<dyn JobStore>,
    notifier: Notifier,
    audit: AuditTrail,
}

impl SilentModeManager {
    pub fn new(ctx: &SchedulerContext, audit: AuditTrail) -> Self {
        Self {
            store: ctx.store.clone(),
            notifier: Notifier::new(ctx.store.clone(), ctx.messenger.clone()),
            audit,
        }
    }

    /// Opens an auto session for every user whose start hour is the current
    /// local hour and who has none open. Returns how many were opened.
    pub async fn activate_due(&self, now: DateTime<Utc>) -> usize {
        let preferences = match self.store.auto_silent_preferences().await {
            Ok(preferences) => preferences,
            Err(e) => {
                error!("Failed to query auto-silent preferences: {}", e);
                return 0;
            }
        };

        let mut activated = 0;
        for preference in &preferences {
            if self.activate(preference, now).await {
                activated += 1;
            }
        }
        activated
    }

    async fn activate(&self, preference: &UserContactPreference, now: DateTime<Utc>) -> bool {
        let user_id = preference.user_id;
        let tz = match parse_timezone(&preference.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                warn!(user_id = %user_id, "Skipping auto-silent check: {}", e);
                return false;
            }
        };
        if now.with_timezone(&tz).hour() != preference.auto_silent_start_hour {
            return false;
        }

        match self.store.active_silent_session(user_id).await {
            Ok(None) => {}
            Ok(Some(_)) => return false,
            Err(e) => {
                warn!(user_id = %user_id, "Failed to check for an active silent session: {}", e);
                return false;
            }
        }

        let hours = window_duration_hours(
            preference.auto_silent_start_hour,
            preference.auto_silent_end_hour,
        );
        let duration_minutes = i64::from(hours) * 60;
        let session = match self
            .store
            .create_silent_session(user_id, duration_minutes, SessionTrigger::Auto)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(user_id = %user_id, "Failed to create silent session: {}", e);
                return false;
            }
        };
        info!(user_id = %user_id, session_id = %session.id, "Auto silent mode activated for {}h", hours);

        let text = messages::silent_mode_activated(preference.auto_silent_end_hour);
        let subject = AuditSubject::new(user_id, "silent_mode_activated", EntityType::SilentSession, session.id);
        self.audit
            .audited(subject, async {
                let delivery = self.notifier.send_now(&preference.phone, &text).await;
                Outcome::succeeded(
                    Some(text.clone()),
                    json!({
                        "trigger_type": SessionTrigger::Auto.as_str(),
                        "duration_minutes": duration_minutes,
                        "delivery": delivery.as_str(),
                    }),
                )
            })
            .await;
        true
    }

    /// Ends every session whose window has elapsed and sends its summary.
    /// Returns how many were ended.
    pub async fn end_expired(&self, now: DateTime<Utc>) -> usize {
        let expired = match self.store.expired_silent_sessions(now).await {
            Ok(expired) => expired,
            Err(e) => {
                error!("Failed to query expired silent sessions: {}", e);
                return 0;
            }
        };

        let mut ended = 0;
        for session in &expired {
            if self.end(session).await {
                ended += 1;
            }
        }
        ended
    }

    async fn end(&self, session: &SilentSession) -> bool {
        let ended = match self.store.end_silent_session(session.id, EXPIRED_REASON).await {
            Ok(ended) => ended,
            Err(e) => {
                error!(session_id = %session.id, "Failed to end silent session: {}", e);
                return false;
            }
        };
        info!(
            session_id = %ended.id,
            "Silent session expired with {} held action(s)", ended.action_count()
        );

        let summary = messages::silent_mode_summary(&ended).unwrap_or_else(|_| {
            warn!(session_id = %ended.id, "Could not build silent mode summary");
            messages::SILENT_SUMMARY_FALLBACK.to_string()
        });
        let contact = self.contact(ended.user_id).await;

        let subject = AuditSubject::new(ended.user_id, "silent_mode_ended", EntityType::SilentSession, ended.id);
        self.audit
            .audited(subject, async {
                let mut details = json!({
                    "reason": EXPIRED_REASON,
                    "action_count": ended.action_count(),
                    "duration_minutes": ended.duration_minutes,
                });
                match &contact {
                    Some(contact) => {
                        let delivery = self.notifier.send_now(&contact.phone, &summary).await;
                        details["delivery"] = json!(delivery.as_str());
                        Outcome::succeeded(Some(summary.clone()), details)
                    }
                    None => {
                        details["delivery"] = json!("skipped");
                        Outcome::succeeded(None, details)
                    }
                }
            })
            .await;
        true
    }

    async fn contact(&self, user_id: Uuid) -> Option<crate::domain::Contact> {
        self.store.contact_for_user(user_id).await.unwrap_or_else(|e| {
            warn!(user_id = %user_id, "Failed to fetch contact: {}", e);
            None
        })
    }
}
