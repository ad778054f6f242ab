//! Per-task executor, grounded on SPEC_FULL.md §4.4/§5: one sub-plan's
//! operator tree is driven single-threaded, cooperatively, one `pull()`
//! step at a time. Cancellation is checked at every operator boundary
//! (the "`jmp_buf env` becomes an explicit error-return field checked at
//! every operator boundary" note in SPEC_FULL.md §9), and a
//! `PullOutcome::Pending` is surfaced to the caller rather than busy-spun,
//! preserving the "`(None, useconds > 0)` means still executing, come
//! back later" contract from the open questions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DbError;
use crate::execution::block::DataBlock;
use crate::execution::operator::{Operator, PullOutcome};
use crate::Result;

/// What one `Task::step` call produced.
#[derive(Debug)]
pub enum TaskOutcome {
    /// A block is ready; `new_group` flags a window/group boundary.
    Block { block: DataBlock, new_group: bool },
    /// Nothing ready yet; caller should back off for roughly this long
    /// before calling `step` again.
    Pending(Duration),
    /// The operator tree is exhausted.
    Done,
}

/// Owns one vnode's operator tree and exposes single-exec enforcement via
/// an owner CAS: only one caller may be "inside" `step` at a time, and a
/// cancelled task rejects further steps immediately.
pub struct Task {
    root: Box<dyn Operator>,
    /// Set while a caller is executing a step; a second concurrent
    /// caller is rejected with `TaskInExec` rather than interleaving pulls
    /// into the same operator tree.
    in_exec: AtomicBool,
    cancelled: Arc<AtomicBool>,
    freed: AtomicBool,
    blocks_produced: AtomicU64,
}

impl Task {
    pub fn new(root: Box<dyn Operator>) -> Self {
        Self {
            root,
            in_exec: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            freed: AtomicBool::new(false),
            blocks_produced: AtomicU64::new(0),
        }
    }

    /// A shared handle a drop-path can flip independently of whoever is
    /// mid-`step`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn free(&self) {
        self.freed.store(true, Ordering::SeqCst);
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    pub fn blocks_produced(&self) -> u64 {
        self.blocks_produced.load(Ordering::Relaxed)
    }

    /// Drive the operator tree one step. Enforces single-exec via a CAS on
    /// `in_exec`: a concurrent caller gets `TaskInExec` rather than
    /// interleaving with the in-flight step.
    pub fn step(&mut self) -> Result<TaskOutcome> {
        if self.freed.load(Ordering::SeqCst) {
            return Err(DbError::JobFreed);
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(DbError::JobCancelled("task cancelled".to_string()));
        }
        if self
            .in_exec
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DbError::TaskInExec);
        }
        let result = self.root.pull();
        self.in_exec.store(false, Ordering::SeqCst);

        match result? {
            PullOutcome::Ready { block, new_group } => {
                self.blocks_produced.fetch_add(1, Ordering::Relaxed);
                Ok(TaskOutcome::Block { block, new_group })
            }
            PullOutcome::Pending(d) => Ok(TaskOutcome::Pending(d)),
            PullOutcome::Done => Ok(TaskOutcome::Done),
        }
    }

    /// Drain the whole tree synchronously, backing off on `Pending` via a
    /// blocking sleep. Intended for tests and single-node callers; the
    /// scheduler drives `step` directly so it can interleave other tasks
    /// while one is `Pending`.
    pub fn run_to_completion(&mut self) -> Result<Vec<DataBlock>> {
        let mut out = Vec::new();
        loop {
            match self.step()? {
                TaskOutcome::Block { block, .. } => out.push(block),
                TaskOutcome::Pending(d) => std::thread::sleep(d),
                TaskOutcome::Done => return Ok(out),
            }
        }
    }

    pub fn is_killed(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
