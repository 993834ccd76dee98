//! crates/scheduler_core/src/orchestrator.rs
//!
//! The tick orchestrator: one call to `run_tick` runs every sweep in order
//! (reminders, scheduled actions, silent-mode expiry, silent-mode activation)
//! and reports what each one did. Sweeps commit their own state; a failure on
//! one item is logged and the sweep moves on.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audit::{AuditSubject, AuditTrail, Outcome};
use crate::context::SchedulerContext;
use crate::dispatcher::ActionDispatcher;
use crate::domain::{ActionError, EntityType, JobPatch, Schedule, ScheduledAction, TickReport};
use crate::ports::JobStore;
use crate::recurrence::next_run;
use crate::reminders::ReminderRunner;
use crate::silent::SilentModeManager;

pub struct TickOrchestrator {
    ctx: SchedulerContext,
}

impl TickOrchestrator {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self { ctx }
    }

    /// Runs one full tick at `now`.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let trace_id = Uuid::new_v4();
        let span = info_span!("tick", trace_id = %trace_id);
        self.sweep_all(trace_id, now).instrument(span).await
    }

    async fn sweep_all(&self, trace_id: Uuid, now: DateTime<Utc>) -> TickReport {
        info!("Tick started at {}", now);
        let audit = AuditTrail::new(self.ctx.store.clone(), trace_id);

        let reminders_sent = ReminderRunner::new(&self.ctx, audit.clone()).run(now).await;
        let actions_executed = self.run_due_jobs(audit.clone(), now).await;

        // Expiry goes first: a window ending at a start hour must be closed
        // before the next one can open.
        let silent = SilentModeManager::new(&self.ctx, audit);
        let silent_sessions_ended = silent.end_expired(now).await;
        let silent_sessions_activated = silent.activate_due(now).await;

        let report = TickReport {
            reminders_sent,
            actions_executed,
            silent_sessions_activated,
            silent_sessions_ended,
        };
        info!(?report, "Tick finished");
        report
    }

    async fn run_due_jobs(&self, audit: AuditTrail, now: DateTime<Utc>) -> usize {
        let jobs = match self.ctx.store.due_jobs(now).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to query due scheduled actions: {}", e);
                return 0;
            }
        };
        if jobs.is_empty() {
            info!("No due scheduled actions found.");
            return 0;
        }

        info!("Found {} scheduled action(s) to execute.", jobs.len());
        let dispatcher = ActionDispatcher::new(&self.ctx, audit.clone());
        for job in &jobs {
            let outcome = dispatcher.dispatch(job, now).await;
            reschedule_or_complete(self.ctx.store.as_ref(), &audit, job, &outcome, now).await;
        }
        jobs.len()
    }
}

/// Writes the job's post-execution state. A failed write is logged and left
/// for the next tick, when the job is still due.
///
/// A job whose action succeeded but whose next run cannot be computed gets a
/// second, failed log entry carrying the recurrence error.
async fn reschedule_or_complete(
    store: &dyn JobStore,
    audit: &AuditTrail,
    job: &ScheduledAction,
    outcome: &Outcome,
    now: DateTime<Utc>,
) {
    let patch = next_state(job, outcome, now);
    if let Some(reason) = &patch.error_message {
        info!(job_id = %job.id, "Marking scheduled action as failed: {}", reason);
        if outcome.success {
            let subject = AuditSubject::new(
                job.user_id,
                job.action_type.clone(),
                EntityType::ScheduledAction,
                job.id,
            );
            let failure = Outcome::failed(
                ActionError::Reschedule(reason.clone()),
                None,
                json!({ "stage": "reschedule", "schedule_type": job.schedule.kind() }),
            );
            audit.record(subject, &failure, None).await;
        }
    }
    if let Err(e) = store.patch_job(job.id, patch).await {
        error!(job_id = %job.id, "Failed to update scheduled action: {}", e);
    }
}

/// The state transition for a job that has just been executed.
pub fn next_state(job: &ScheduledAction, outcome: &Outcome, now: DateTime<Utc>) -> JobPatch {
    if !outcome.success {
        let reason = outcome
            .error_message()
            .unwrap_or_else(|| "Action failed".to_string());
        return JobPatch::failed(now, reason);
    }

    match &job.schedule {
        Schedule::OneTime => JobPatch::completed(now),
        Schedule::Cron { expression } => match next_run(expression, now, &job.timezone) {
            Ok(next) => JobPatch::rescheduled(next, now),
            Err(e) => JobPatch::failed(now, e.to_string()),
        },
    }
}
