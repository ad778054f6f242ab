//! Central response dispatch, grounded on original `scheduler.c`
//! `schHandleCallback`/`schGetCallbackFp`: every task-protocol response
//! (or synthesized timeout/cancellation) funnels through here, which
//! decides retry vs. terminal failure vs. propagating success up the DAG.

use std::sync::Arc;

use crate::error::DbError;
use crate::scheduler::job::Job;
use crate::scheduler::launch::{launch_task, on_task_failed, on_task_succeeded, TaskDispatcher};
use crate::Result;

/// Map an error to the stable i32 code recorded on the job, per SPEC_FULL.md
/// §7 ("the job's terminal code is the first recorded non-zero [...] code").
/// Codes are scheduler-internal and need not match any particular wire
/// convention; only their non-zero-ness and first-writer-wins ordering are
/// observable invariants (§8).
pub fn error_code(err: &DbError) -> i32 {
    match err {
        DbError::Timeout(_) => 1,
        DbError::Network(_) | DbError::Unavailable(_) => 2,
        DbError::StatusError { .. } => 3,
        DbError::TooManyTimeWindows(_) => 4,
        DbError::NotEnoughBuffer(_) => 5,
        DbError::DataVersionMismatch(_) => 6,
        DbError::QueryCancelled | DbError::JobCancelled(_) => 7,
        DbError::JobFreed => 8,
        _ => 99,
    }
}

/// Handle the outcome of one task's QUERY round trip. On success,
/// propagates up the DAG via `on_task_succeeded`. On failure, applies the
/// retry policy: a transient error with a remaining candidate re-dispatches
/// to the next address; otherwise the task (and possibly the job) fails.
pub async fn handle_task_response(
    job: &Arc<Job>,
    level_idx: usize,
    task_idx: usize,
    outcome: Result<()>,
    dispatcher: &dyn TaskDispatcher,
) -> Result<()> {
    match outcome {
        Ok(()) => on_task_succeeded(job, level_idx, task_idx, dispatcher).await,
        Err(e) => {
            let has_next = {
                let levels = job.levels.lock();
                let task = &levels[level_idx].tasks[task_idx];
                crate::scheduler::retry::is_transient(&e) && task.advance_candidate()
            };
            if has_next {
                launch_task(job, level_idx, task_idx, dispatcher).await
            } else {
                on_task_failed(job, level_idx, task_idx, error_code(&e));
                Ok(())
            }
        }
    }
}
