pub mod audit;
pub mod context;
pub mod delivery;
pub mod dispatcher;
pub mod domain;
pub mod messages;
pub mod orchestrator;
pub mod ports;
pub mod recurrence;
pub mod reminders;
pub mod silent;

#[cfg(test)]
mod testing;

pub use context::SchedulerContext;
pub use domain::{Action, ActionError, JobStatus, Schedule, ScheduledAction, TickReport};
pub use orchestrator::TickOrchestrator;
pub use ports::{JobStore, MessagingService, PortError, PortResult, TextGenerationService};
pub use recurrence::{next_run, window_duration_hours, RecurrenceError};
