//! A DAG level, grounded on SPEC_FULL.md §3 "Level" / original
//! `scheduler.c` `SSchLevel`.
//!
//! Levels are stored leaves-first in `Job::levels` (index 0 = deepest/leaf
//! level); `Level::index` instead carries the spec's own numbering where
//! level 0 is the root/final aggregator, so a leaf level has the largest
//! `index` value. Launch always proceeds from the back of `Job::levels`
//! (the leaf level) toward the front (level 0).

use parking_lot::RwLock;

use crate::scheduler::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStatus {
    NotStart,
    Executing,
    PartialSucceed,
    Failed,
}

pub struct Level {
    /// The spec's own level numbering: 0 is the root/final aggregator.
    pub index: usize,
    pub tasks: Vec<Task>,
    succeeded: RwLock<usize>,
    failed: RwLock<usize>,
    status: RwLock<LevelStatus>,
}

impl Level {
    pub fn new(index: usize, tasks: Vec<Task>) -> Self {
        Self {
            index,
            tasks,
            succeeded: RwLock::new(0),
            failed: RwLock::new(0),
            status: RwLock::new(LevelStatus::NotStart),
        }
    }

    pub fn task_num(&self) -> usize {
        self.tasks.len()
    }

    pub fn status(&self) -> LevelStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: LevelStatus) {
        *self.status.write() = status;
    }

    /// Record one task's success under the level's writer lock and decide
    /// whether the level as a whole just completed.
    ///
    /// Per SPEC_FULL.md §8 ("Level completion: a level transitions from
    /// executing to PartialSucceed iff `succeeded == taskNum` and `failed
    /// == 0`"), and §5 ("the level's PartialSucceed/Failed transition is
    /// decided by the last task to complete"): the decision is made here,
    /// under the lock, by whichever caller's increment makes the counters
    /// add up to `task_num` — exactly one caller observes that condition.
    pub fn record_task_succeeded(&self) -> LevelOutcome {
        let mut succeeded = self.succeeded.write();
        *succeeded += 1;
        let failed = *self.failed.read();
        if *succeeded + failed == self.task_num() {
            if failed == 0 {
                self.set_status(LevelStatus::PartialSucceed);
                LevelOutcome::Completed
            } else {
                self.set_status(LevelStatus::Failed);
                LevelOutcome::Failed
            }
        } else {
            LevelOutcome::Pending
        }
    }

    pub fn record_task_failed(&self) -> LevelOutcome {
        let mut failed = self.failed.write();
        *failed += 1;
        let succeeded = *self.succeeded.read();
        if *failed + succeeded == self.task_num() {
            self.set_status(LevelStatus::Failed);
            LevelOutcome::Failed
        } else {
            LevelOutcome::Pending
        }
    }

    pub fn succeeded_count(&self) -> usize {
        *self.succeeded.read()
    }

    pub fn failed_count(&self) -> usize {
        *self.failed.read()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    Pending,
    Completed,
    Failed,
}
