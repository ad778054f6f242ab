//! Level-driven launch, grounded on SPEC_FULL.md §4.7 / original
//! `scheduler.c` `schLaunchJob`/`schLaunchLevelTasks`/`schLaunchTask`.
//!
//! "Level-driven launch: starts at the deepest level (leaves, numerically
//! largest index in this system's convention). A task becomes launchable
//! only when all its children signaled success." `Job::levels` is stored
//! leaves-first (index 0 = deepest), so launch begins at `levels[0]`.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::DbError;
use crate::network::rpc::TaskMsgType;
use crate::scheduler::job::{Job, JobStatus};
use crate::scheduler::level::{Level, LevelOutcome};
use crate::scheduler::task::{SchedTaskState, Task, TaskRef};
use crate::Result;

/// Sends the wire QUERY message for one task to its current candidate
/// address. Abstracted behind a trait, exactly like
/// `execution::exchange::FetchDispatcher`, so launch logic is unit
/// testable without a live network round trip.
#[async_trait::async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch_query(&self, addr: SocketAddr, task_id: u64, plan: &Bytes) -> Result<()>;
    async fn dispatch_drop(&self, addr: SocketAddr, task_id: u64);
}

/// Launch the job: dispatch every leaf task. Per §4.7, `NotStart ->
/// Executing` happens here.
pub async fn launch_job(job: &Arc<Job>, dispatcher: &dyn TaskDispatcher) -> Result<()> {
    if !job.compare_and_set_status(JobStatus::NotStart, JobStatus::Executing) {
        return Err(DbError::InvalidState(format!(
            "job {} launched from non-NotStart status {:?}",
            job.job_id,
            job.status()
        )));
    }
    launch_level_tasks(job, 0, dispatcher).await
}

/// Dispatch every ready, not-yet-started task at `level_idx`. Called once
/// at job launch for the leaf level, and again every time a task's last
/// child reports success and makes it ready.
pub async fn launch_level_tasks(job: &Arc<Job>, level_idx: usize, dispatcher: &dyn TaskDispatcher) -> Result<()> {
    let levels = job.levels.lock();
    let level = levels.get(level_idx).ok_or_else(|| DbError::Internal(format!("no level {level_idx}")))?;
    let ready_task_ids: Vec<usize> = level
        .tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_ready() && t.state() == SchedTaskState::NotStart)
        .map(|(i, _)| i)
        .collect();
    // Drop the lock before awaiting network sends; tasks are addressed by
    // stable index so re-acquiring per-dispatch is safe.
    drop(levels);

    for task_idx in ready_task_ids {
        launch_task(job, level_idx, task_idx, dispatcher).await?;
    }
    Ok(())
}

/// Dispatch one task's QUERY message to its current candidate address.
pub async fn launch_task(
    job: &Arc<Job>,
    level_idx: usize,
    task_idx: usize,
    dispatcher: &dyn TaskDispatcher,
) -> Result<()> {
    let (addr, task_id, plan) = {
        let levels = job.levels.lock();
        let task = &levels[level_idx].tasks[task_idx];
        let addr = task.current_candidate().ok_or_else(|| {
            DbError::Internal(format!("task {} has no candidate addresses", task.task_id))
        })?;
        (addr, task.task_id, task.plan.clone())
    };

    let result = dispatcher.dispatch_query(addr, task_id, &plan).await;

    let levels = job.levels.lock();
    let task = &levels[level_idx].tasks[task_idx];
    match result {
        Ok(()) => {
            task.set_state(SchedTaskState::Executing);
            task.set_last_sent_type(TaskMsgType::Query);
            task.record_exec_addr(addr);
            Ok(())
        }
        Err(e) => {
            // Dispatch failure at launch time is handled the same way as a
            // post-send transient error: the retry module decides whether
            // to re-launch on the next candidate.
            Err(e)
        }
    }
}

/// Propagate one task's terminal success up through its parent and level,
/// per §4.7: "On a child's success, it increments each parent's
/// `childReady`; when `childReady == len(children)`, the parent is
/// launched. On task success at level 0, the level collapses the job to
/// PartialSucceed and fetching is unblocked."
pub async fn on_task_succeeded(
    job: &Arc<Job>,
    level_idx: usize,
    task_idx: usize,
    dispatcher: &dyn TaskDispatcher,
) -> Result<()> {
    let (parent, outcome, is_root_level) = {
        let levels = job.levels.lock();
        let task = &levels[level_idx].tasks[task_idx];
        task.set_state(SchedTaskState::Succeed);
        let level = &levels[level_idx];
        let outcome = level.record_task_succeeded();
        (task.parent, outcome, level.index == 0)
    };

    if let Some(parent_ref) = parent {
        let became_ready = {
            let levels = job.levels.lock();
            levels[parent_ref.level_idx].tasks[parent_ref.task_idx].mark_child_ready()
        };
        if became_ready {
            launch_task(job, parent_ref.level_idx, parent_ref.task_idx, dispatcher).await?;
        }
    }

    if is_root_level && matches!(outcome, LevelOutcome::Completed) {
        job.compare_and_set_status(JobStatus::Executing, JobStatus::PartialSucceed);
        job.result_ready.notify_waiters();
    }

    Ok(())
}

/// Propagate one task's terminal, non-retryable failure. Tasks marked
/// `wait_all_peers` only fail the job once every sibling at the level has
/// also reported terminal (§4.7), preserving the *first* non-zero error
/// code on the job (§7 "first-writer wins").
pub fn on_task_failed(job: &Arc<Job>, level_idx: usize, task_idx: usize, err_code: i32) {
    let (level_outcome, wait_all_peers) = {
        let levels = job.levels.lock();
        let task = &levels[level_idx].tasks[task_idx];
        task.set_state(SchedTaskState::Failed);
        let level = &levels[level_idx];
        (level.record_task_failed(), task.wait_all_peers)
    };

    job.set_err_code_first(err_code);

    let level_done = matches!(level_outcome, LevelOutcome::Failed);
    if !wait_all_peers || level_done {
        job.set_status(JobStatus::Failed);
    }
}

pub fn leaf_level_idx(levels: &[Level]) -> usize {
    // Leaves are stored at index 0 by construction (see module docs).
    let _ = levels;
    0
}
