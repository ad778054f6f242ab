//! Job state machine, grounded on SPEC_FULL.md §4.7 / original `scheduler.c`
//! `SSchJob` and `schCheckAndUpdateJobStatus`.
//!
//! A job owns its `levels` arena outright (§9 "the job owns the `levels`
//! vector, each level owns its `tasks` vector"); tasks refer to each other
//! by `(level_idx, task_idx)` index pairs rather than shared pointers, so
//! the whole DAG is freed in one move when the job drops.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::execution::block::DataBlock;
use crate::scheduler::level::Level;

/// Job states and the edges between them, per SPEC_FULL.md §4.7:
/// `Null -> NotStart -> Executing -> {PartialSucceed, Failed, Cancelling,
/// Dropping} -> {Succeed, Failed, Cancelled, Dropped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Null,
    NotStart,
    Executing,
    PartialSucceed,
    Failed,
    Cancelling,
    Dropping,
    Succeed,
    Cancelled,
    Dropped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Dropped)
    }
}

/// A single non-recoverable failure code, first-writer-wins across every
/// task callback that might race to set it (§7 "first-writer wins").
#[derive(Default)]
struct ErrCode {
    code: AtomicI32,
    set: AtomicBool,
}

impl ErrCode {
    /// Record `code` only if nothing has been recorded yet. Returns `true`
    /// if this call was the one that won the race.
    fn set_first(&self, code: i32) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| {
                self.code.store(code, Ordering::SeqCst);
                true
            })
            .unwrap_or(false)
    }

    fn get(&self) -> Option<i32> {
        if self.set.load(Ordering::SeqCst) {
            Some(self.code.load(Ordering::SeqCst))
        } else {
            None
        }
    }
}

/// One client query, per SPEC_FULL.md §3 "Job". Levels are stored leaves
/// first (index 0 is the level-0 root/final aggregator per the spec's
/// numeric convention is addressed by `Level::index`, not array position;
/// `levels[0]` here is the deepest/leaf level so launch walks the vector in
/// order).
pub struct Job {
    pub job_id: u64,
    status: Mutex<JobStatus>,
    pub levels: Mutex<Vec<Level>>,
    /// Concurrent callback/drop safety: the job is only freed once this
    /// reaches zero *and* status is terminal (§3 lifecycle note).
    ref_count: AtomicUsize,
    err: ErrCode,
    /// Signalled whenever the job's result becomes available or it reaches
    /// a terminal state, so `fetch_rows` can block on it (§5).
    pub result_ready: Notify,
    result_buffer: Mutex<Option<DataBlock>>,
    /// CAS-guarded: at most one fetch RPC may be in flight for a job at a
    /// time (`remoteFetch` in the original).
    remote_fetch: AtomicBool,
    user_fetch: AtomicBool,
}

impl Job {
    pub fn new(job_id: u64, levels: Vec<Level>) -> Arc<Self> {
        Arc::new(Self {
            job_id,
            status: Mutex::new(JobStatus::NotStart),
            levels: Mutex::new(levels),
            ref_count: AtomicUsize::new(1),
            err: ErrCode::default(),
            result_ready: Notify::new(),
            result_buffer: Mutex::new(None),
            remote_fetch: AtomicBool::new(false),
            user_fetch: AtomicBool::new(false),
        })
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: JobStatus) {
        *self.status.lock() = status;
        if status.is_terminal() {
            self.result_ready.notify_waiters();
        }
    }

    /// Transition iff the current status matches `from`; used by callers
    /// that must not clobber a status another racing callback already
    /// advanced past (e.g. don't re-enter `Executing` after a drop already
    /// moved the job to `Dropping`).
    pub fn compare_and_set_status(&self, from: JobStatus, to: JobStatus) -> bool {
        let mut guard = self.status.lock();
        if *guard == from {
            *guard = to;
            drop(guard);
            if to.is_terminal() {
                self.result_ready.notify_waiters();
            }
            true
        } else {
            false
        }
    }

    /// Record the job's terminal error code, first-writer wins (§7).
    pub fn set_err_code_first(&self, code: i32) -> bool {
        self.err.set_first(code)
    }

    pub fn err_code(&self) -> i32 {
        self.err.get().unwrap_or(0)
    }

    pub fn has_err(&self) -> bool {
        self.err.get().is_some()
    }

    pub fn incref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the reference count, returning the count after the
    /// decrement. Freeing logic (outside this type, in `scheduler::drop`)
    /// only tears the job down once this reaches zero *and* `status()` is
    /// terminal.
    pub fn decref(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub fn is_freeable(&self) -> bool {
        self.ref_count() == 0 && self.status().is_terminal()
    }

    pub fn set_result(&self, block: DataBlock) {
        *self.result_buffer.lock() = Some(block);
        self.result_ready.notify_waiters();
    }

    pub fn take_result(&self) -> Option<DataBlock> {
        self.result_buffer.lock().take()
    }

    /// CAS `remote_fetch` from false to true; used to prevent a second
    /// fetch RPC from being issued while one is already in flight.
    pub fn try_start_fetch(&self) -> bool {
        self.remote_fetch
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_fetch(&self) {
        self.remote_fetch.store(false, Ordering::SeqCst);
    }

    pub fn set_user_fetch(&self) {
        self.user_fetch.store(true, Ordering::SeqCst);
    }

    pub fn user_fetch_requested(&self) -> bool {
        self.user_fetch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_code_first_writer_wins() {
        let err = ErrCode::default();
        assert!(err.set_first(5));
        assert!(!err.set_first(9));
        assert_eq!(err.get(), Some(5));
    }

    #[test]
    fn compare_and_set_rejects_stale_transition() {
        let job = Job::new(1, vec![]);
        job.set_status(JobStatus::Executing);
        assert!(!job.compare_and_set_status(JobStatus::NotStart, JobStatus::Failed));
        assert!(job.compare_and_set_status(JobStatus::Executing, JobStatus::PartialSucceed));
        assert_eq!(job.status(), JobStatus::PartialSucceed);
    }

    #[test]
    fn freeable_only_when_ref_zero_and_terminal() {
        let job = Job::new(1, vec![]);
        job.set_status(JobStatus::Succeed);
        assert!(!job.is_freeable(), "ref count starts at 1");
        job.decref();
        assert!(job.is_freeable());
    }
}
