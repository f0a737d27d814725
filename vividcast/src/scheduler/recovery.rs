//! Startup reconciliation.
//!
//! Runs once after migrations and before the worker pool and API start:
//! - COMPLETED tasks whose settlement never landed (crash between the
//!   completion transition and the ledger write) are settled now; the
//!   settlement path is idempotent, so a crash during recovery is safe too.
//! - PROCESSING tasks have no live executor after a restart and the
//!   pipeline does not support resumption, so they fail with their hold
//!   released (which at this point means simply not restoring it).
//! - PENDING tasks get their holds rebuilt from `reserved_credits` and are
//!   re-enqueued in creation order.

use tracing::{info, warn};

use crate::database::models::TaskStatus;
use crate::scheduler::Scheduler;
use crate::Result;

/// Counts of what the recovery pass touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub settlements_retried: usize,
    pub interrupted_failed: usize,
    pub pending_requeued: usize,
}

/// Reconcile persisted task state with the empty executor set of a fresh
/// process.
pub async fn reconcile(scheduler: &Scheduler) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for task in scheduler.task_repo().list_unsettled_completed().await? {
        let applied = scheduler
            .ledger()
            .settle_consume(&task.owner_id, &task.id, task.reserved_credits, &task.id)
            .await?;
        if applied {
            warn!(task_id = %task.id, "recovered missing settlement");
            report.settlements_retried += 1;
        }
    }

    for task in scheduler.task_repo().list_non_terminal().await? {
        match TaskStatus::parse(&task.status) {
            Some(TaskStatus::Processing) => {
                let applied = scheduler
                    .task_repo()
                    .transition(
                        &task.id,
                        TaskStatus::Failed,
                        None,
                        Some("interrupted by service restart"),
                    )
                    .await?;
                if applied {
                    report.interrupted_failed += 1;
                }
            }
            Some(TaskStatus::Pending) => {
                scheduler.ledger().restore_hold(
                    &task.id,
                    &task.owner_id,
                    task.reserved_credits,
                );
                scheduler.restore_reservation(&task.id, &task.id);
                report.pending_requeued += 1;
            }
            _ => {}
        }
    }

    if report.pending_requeued > 0 {
        scheduler.queue().signal();
    }

    info!(
        settlements = report.settlements_retried,
        interrupted = report.interrupted_failed,
        requeued = report.pending_requeued,
        "startup recovery completed"
    );

    Ok(report)
}
