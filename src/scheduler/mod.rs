//! Scheduler (C8): per-job DAG expansion, task state machine, retry,
//! cancel/drop, and user-visible fetch, grounded on SPEC_FULL.md §4.7 and
//! the original `scheduler.c`.
//!
//! The manager is the one piece of genuinely global mutable state this
//! component owns (§9 "Global mutable state [...] becomes a single
//! `Context`"); everything else lives on `Job`/`Level`/`Task` and is
//! reached only through it.

pub mod callback;
pub mod drop;
pub mod fetch;
pub mod job;
pub mod launch;
pub mod level;
pub mod retry;
pub mod task;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::SchedulerConfig;
use crate::error::DbError;
use crate::Result;

pub use job::{Job, JobStatus};
pub use launch::TaskDispatcher;
pub use level::{Level, LevelOutcome, LevelStatus};
pub use task::{SchedTaskState, Task, TaskRef};

/// Registry of live jobs, keyed by globally unique job id. One instance
/// per mnode/scheduling tier (§9's `Context`).
pub struct SchedulerManager {
    jobs: DashMap<u64, Arc<Job>>,
    next_job_id: AtomicU64,
    config: SchedulerConfig,
}

impl Default for SchedulerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerManager {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self { jobs: DashMap::new(), next_job_id: AtomicU64::new(1), config }
    }

    pub fn alloc_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a freshly built job (levels already populated by the
    /// caller's DAG expansion) and launch it. Rejects the submission once
    /// `config.max_job_num` live jobs are already registered, matching
    /// the original's bounded job table rather than growing unbounded.
    pub async fn submit(&self, job: Arc<Job>, dispatcher: &dyn TaskDispatcher) -> Result<()> {
        if self.jobs.len() >= self.config.max_job_num {
            return Err(DbError::ResourceExhausted(format!(
                "scheduler at capacity ({} jobs)",
                self.config.max_job_num
            )));
        }
        self.jobs.insert(job.job_id, Arc::clone(&job));
        launch::launch_job(&job, dispatcher).await
    }

    pub fn get(&self, job_id: u64) -> Option<Arc<Job>> {
        self.jobs.get(&job_id).map(|e| Arc::clone(e.value()))
    }

    /// User-initiated drop: fans out best-effort DROP-TASK RPCs, then
    /// decrements the reference count and frees the job's arena entry once
    /// it reaches zero and the job is terminal (§3 job lifecycle).
    pub async fn drop_job(&self, job_id: u64, dispatcher: &dyn TaskDispatcher) -> Result<()> {
        let job = self.get(job_id).ok_or_else(|| DbError::NotFound(format!("job {job_id}")))?;
        drop::drop_job(&job, dispatcher).await;
        if job.decref() == 0 && job.is_freeable() {
            self.jobs.remove(&job_id);
        }
        Ok(())
    }

    pub async fn cancel_job(&self, job_id: u64, dispatcher: &dyn TaskDispatcher) -> Result<()> {
        let job = self.get(job_id).ok_or_else(|| DbError::NotFound(format!("job {job_id}")))?;
        drop::cancel_job(&job, dispatcher).await;
        if job.decref() == 0 && job.is_freeable() {
            self.jobs.remove(&job_id);
        }
        Ok(())
    }

    /// Release a caller's reference without dropping/cancelling (normal
    /// completion path): frees the arena slot once ref count hits zero on
    /// a terminal job.
    pub fn release(&self, job_id: u64) {
        if let Some(job) = self.get(job_id) {
            if job.decref() == 0 && job.is_freeable() {
                self.jobs.remove(&job_id);
            }
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}
