//! User-visible fetch path, grounded on SPEC_FULL.md §4.7 / original
//! `scheduler.c` `schedulerFetchRows`/`schFetchFromRemote`.
//!
//! "User-level fetch posts a user-fetch flag. If the job is
//! PartialSucceed, a fetch RPC is issued to the single level-0 task;
//! `remoteFetch` is CAS-set to prevent duplicate in-flight fetches. The
//! response either returns a data buffer and completion flag (sets job
//! Succeed), or surfaces an error (fails the job)."

use std::sync::Arc;

use crate::error::DbError;
use crate::execution::block::DataBlock;
use crate::scheduler::callback::error_code;
use crate::scheduler::job::{Job, JobStatus};
use crate::Result;

/// Sends the FETCH RPC to the level-0 task and awaits its response.
/// Abstracted for unit testing, matching the pattern of `TaskDispatcher`
/// and `FetchDispatcher` elsewhere in the scheduler/executor.
#[async_trait::async_trait]
pub trait RowFetcher: Send + Sync {
    async fn fetch_rows(&self, task_id: u64) -> Result<(DataBlock, bool)>;
}

pub enum FetchRowsOutcome {
    Data(DataBlock),
    /// Fetch completed with no further rows; job reached `Succeed`.
    Done,
}

/// Drive one `fetch_rows` call. Returns `DbError::NotEnoughBuffer`-style
/// contract violations to the caller as `Err`; per §7, any recorded job
/// error is surfaced as `job.err_code()` with a synthetic empty-completed
/// block rather than panicking the caller — modeled here by returning the
/// error directly, since this crate's `fetch_rows` is already fallible.
pub async fn fetch_rows(job: &Arc<Job>, fetcher: &dyn RowFetcher) -> Result<FetchRowsOutcome> {
    job.set_user_fetch();

    if job.has_err() {
        return Err(DbError::Internal(format!("job {} failed with code {}", job.job_id, job.err_code())));
    }

    match job.status() {
        JobStatus::Succeed => return Ok(FetchRowsOutcome::Done),
        JobStatus::Failed | JobStatus::Cancelled | JobStatus::Dropped => {
            return Err(DbError::Internal(format!(
                "job {} is terminal ({:?}) with code {}",
                job.job_id,
                job.status(),
                job.err_code()
            )))
        }
        JobStatus::PartialSucceed => {}
        other => {
            return Err(DbError::InvalidState(format!(
                "fetch_rows called before job {} reached PartialSucceed (status {:?})",
                job.job_id, other
            )))
        }
    }

    if !job.try_start_fetch() {
        return Err(DbError::InvalidState(format!("fetch already in flight for job {}", job.job_id)));
    }

    let root_task_id = {
        let levels = job.levels.lock();
        let root_level = levels.iter().find(|l| l.index == 0).ok_or_else(|| {
            job.end_fetch();
            DbError::Internal(format!("job {} has no level-0 task", job.job_id))
        })?;
        if root_level.tasks.len() != 1 {
            job.end_fetch();
            return Err(DbError::Internal(format!(
                "level 0 must carry exactly one task, found {}",
                root_level.tasks.len()
            )));
        }
        root_level.tasks[0].task_id
    };

    let result = fetcher.fetch_rows(root_task_id).await;
    job.end_fetch();

    match result {
        Ok((block, completed)) => {
            if completed {
                job.compare_and_set_status(JobStatus::PartialSucceed, JobStatus::Succeed);
            }
            job.set_result(block);
            match job.take_result() {
                Some(b) => Ok(FetchRowsOutcome::Data(b)),
                None => Ok(FetchRowsOutcome::Done),
            }
        }
        Err(e) => {
            job.set_err_code_first(error_code(&e));
            job.set_status(JobStatus::Failed);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::level::Level;
    use crate::scheduler::task::Task;
    use bytes::Bytes;

    fn job_with_root() -> Arc<Job> {
        let task = Task::new(42, 0, vec!["127.0.0.1:1".parse().unwrap()], Bytes::new(), None, vec![]);
        let job = Job::new(1, vec![Level::new(0, vec![task])]);
        job.set_status(JobStatus::PartialSucceed);
        job
    }

    struct StubFetcher {
        completed: bool,
    }

    #[async_trait::async_trait]
    impl RowFetcher for StubFetcher {
        async fn fetch_rows(&self, _task_id: u64) -> Result<(DataBlock, bool)> {
            Ok((DataBlock::new(1), self.completed))
        }
    }

    #[tokio::test]
    async fn fetch_before_partial_succeed_rejected() {
        let task = Task::new(42, 0, vec!["127.0.0.1:1".parse().unwrap()], Bytes::new(), None, vec![]);
        let job = Job::new(1, vec![Level::new(0, vec![task])]);
        let fetcher = StubFetcher { completed: true };
        assert!(fetch_rows(&job, &fetcher).await.is_err());
    }

    #[tokio::test]
    async fn completed_fetch_moves_job_to_succeed() {
        let job = job_with_root();
        let fetcher = StubFetcher { completed: true };
        let outcome = fetch_rows(&job, &fetcher).await.unwrap();
        assert!(matches!(outcome, FetchRowsOutcome::Data(_)));
        assert_eq!(job.status(), JobStatus::Succeed);
    }

    #[tokio::test]
    async fn incomplete_fetch_keeps_job_partial() {
        let job = job_with_root();
        let fetcher = StubFetcher { completed: false };
        fetch_rows(&job, &fetcher).await.unwrap();
        assert_eq!(job.status(), JobStatus::PartialSucceed);
    }
}
