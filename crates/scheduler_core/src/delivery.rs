//! crates/scheduler_core/src/delivery.rs
//!
//! Routes scheduler-originated messages either to the messaging gateway or,
//! while the user has an active silent session, into that session's
//! accumulated actions.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::SilentAction;
use crate::ports::{JobStore, MessagingService};

/// What happened to a message handed to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
    Held { session_id: Uuid },
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Failed => "failed",
            Delivery::Held { .. } => "held",
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn JobStore>,
    messenger: Arc<dyn MessagingService>,
}

impl Notifier {
    pub fn new(store: Arc<dyn JobStore>, messenger: Arc<dyn MessagingService>) -> Self {
        Self { store, messenger }
    }

    /// Delivers `text`, holding it back if the user is in silent mode.
    ///
    /// A store failure while checking or recording the session falls through
    /// to a direct send.
    pub async fn deliver(&self, user_id: Uuid, phone: &str, kind: &str, text: &str) -> Delivery {
        match self.store.active_silent_session(user_id).await {
            Ok(Some(session)) => {
                let action = SilentAction {
                    action_type: kind.to_string(),
                    content: text.to_string(),
                };
                match self.store.record_silent_action(session.id, action).await {
                    Ok(()) => {
                        debug!(user_id = %user_id, session_id = %session.id, "Held message for silent session");
                        return Delivery::Held {
                            session_id: session.id,
                        };
                    }
                    Err(e) => warn!(
                        user_id = %user_id,
                        "Failed to record silent action, sending directly: {}", e
                    ),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(
                user_id = %user_id,
                "Failed to look up silent session, sending directly: {}", e
            ),
        }
        self.send_now(phone, text).await
    }

    /// Sends `text` straight to the gateway.
    pub async fn send_now(&self, phone: &str, text: &str) -> Delivery {
        if self.messenger.send(phone, text).await {
            Delivery::Sent
        } else {
            Delivery::Failed
        }
    }
}
