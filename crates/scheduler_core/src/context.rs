//! crates/scheduler_core/src/context.rs
//!
//! The explicit set of collaborators every sweep works with. Built once at
//! process start and handed to the orchestrator; nothing in the engine reaches
//! for a global client.

use std::sync::Arc;

use crate::ports::{JobStore, MessagingService, TextGenerationService};

#[derive(Clone)]
pub struct SchedulerContext {
    pub store: Arc<dyn JobStore>,
    pub messenger: Arc<dyn MessagingService>,
    pub generator: Arc<dyn TextGenerationService>,
}

impl SchedulerContext {
    pub fn new(
        store: Arc<dyn JobStore>,
        messenger: Arc<dyn MessagingService>,
        generator: Arc<dyn TextGenerationService>,
    ) -> Self {
        Self {
            store,
            messenger,
            generator,
        }
    }
}
