//! Scheduler-side task, grounded on SPEC_FULL.md §3 "Task" / original
//! `scheduler.c` `SSchTask`.
//!
//! A task is addressed from its level by index; parent/child links are
//! `(level_idx, task_idx)` pairs into the job's arena rather than pointers
//! (§9), so the whole DAG can be torn down by dropping the job's `levels`
//! vector without any cycle-breaking dance.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;

use crate::network::rpc::TaskMsgType;

/// Index pair addressing one task inside a job's level arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub level_idx: usize,
    pub task_idx: usize,
}

/// Scheduler-side view of a task's lifecycle. Distinct from
/// `query_worker::WorkerTaskState`, which is the vnode-local mirror of the
/// same task; this is the scheduler's bookkeeping of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedTaskState {
    NotStart,
    Executing,
    PartialSucceed,
    Succeed,
    Failed,
    Cancelling,
    Cancelled,
    Dropping,
    Dropped,
}

impl SchedTaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SchedTaskState::Succeed | SchedTaskState::Failed | SchedTaskState::Cancelled | SchedTaskState::Dropped)
    }
}

pub struct Task {
    pub task_id: u64,
    pub level_idx: usize,
    state: std::sync::atomic::AtomicU8,
    /// Last message type sent to this task, used to validate the next
    /// response is exactly `last_sent.expected_response()` (§4.6/§8).
    last_sent: parking_lot::Mutex<Option<TaskMsgType>>,
    /// Candidate node addresses in priority order, with a round-robin
    /// index advanced on retry (§3 "candidate node addresses with
    /// round-robin index").
    pub candidates: Vec<SocketAddr>,
    candidate_idx: AtomicUsize,
    /// Every address this task actually executed on, for best-effort
    /// drop-RPC fan-out cleanup (§3 "actual execution-history addresses").
    exec_addrs: parking_lot::Mutex<Vec<SocketAddr>>,
    pub plan: Bytes,
    pub parent: Option<TaskRef>,
    pub children: Vec<TaskRef>,
    /// Number of children that have reported success; the task is
    /// launchable once this equals `children.len()` (§3/§4.7).
    child_ready: AtomicUsize,
    /// `owner` CAS field (§5): nonzero while a thread is mid-`exec` for
    /// this task; zero otherwise. Modeled as a generation id, not a raw
    /// thread id, since the scheduler's executor is multi-threaded tokio.
    owner: AtomicU64,
    /// Tasks marked "wait for all peers" accumulate failures at the level
    /// and only propagate once every sibling is terminal (§4.7).
    pub wait_all_peers: bool,
    /// Tasks that never actually launched (e.g. level never reached) are
    /// skipped during drop fan-out (§4.7 "no-need-drop").
    pub no_need_drop: bool,
}

impl Task {
    pub fn new(
        task_id: u64,
        level_idx: usize,
        candidates: Vec<SocketAddr>,
        plan: Bytes,
        parent: Option<TaskRef>,
        children: Vec<TaskRef>,
    ) -> Self {
        Self {
            task_id,
            level_idx,
            state: std::sync::atomic::AtomicU8::new(SchedTaskState::NotStart as u8),
            last_sent: parking_lot::Mutex::new(None),
            candidates,
            candidate_idx: AtomicUsize::new(0),
            exec_addrs: parking_lot::Mutex::new(Vec::new()),
            plan,
            parent,
            children,
            child_ready: AtomicUsize::new(0),
            owner: AtomicU64::new(0),
            wait_all_peers: false,
            no_need_drop: false,
        }
    }

    pub fn state(&self) -> SchedTaskState {
        match self.state.load(Ordering::SeqCst) {
            0 => SchedTaskState::NotStart,
            1 => SchedTaskState::Executing,
            2 => SchedTaskState::PartialSucceed,
            3 => SchedTaskState::Succeed,
            4 => SchedTaskState::Failed,
            5 => SchedTaskState::Cancelling,
            6 => SchedTaskState::Cancelled,
            7 => SchedTaskState::Dropping,
            _ => SchedTaskState::Dropped,
        }
    }

    pub fn set_state(&self, state: SchedTaskState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn last_sent_type(&self) -> Option<TaskMsgType> {
        *self.last_sent.lock()
    }

    pub fn set_last_sent_type(&self, t: TaskMsgType) {
        *self.last_sent.lock() = Some(t);
    }

    pub fn current_candidate(&self) -> Option<SocketAddr> {
        self.candidates.get(self.candidate_idx.load(Ordering::SeqCst)).copied()
    }

    pub fn candidate_idx(&self) -> usize {
        self.candidate_idx.load(Ordering::SeqCst)
    }

    /// Advance to the next candidate address for a retry. Returns `false`
    /// (no more candidates) without mutating the index when already at the
    /// last candidate.
    pub fn advance_candidate(&self) -> bool {
        let cur = self.candidate_idx.load(Ordering::SeqCst);
        if cur + 1 < self.candidates.len() {
            self.candidate_idx.store(cur + 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn record_exec_addr(&self, addr: SocketAddr) {
        self.exec_addrs.lock().push(addr);
    }

    pub fn exec_addrs(&self) -> Vec<SocketAddr> {
        self.exec_addrs.lock().clone()
    }

    /// A task is "ready to launch" once every child has reported success
    /// (§3). Leaf tasks (`children.is_empty()`) are ready immediately.
    pub fn is_ready(&self) -> bool {
        self.child_ready.load(Ordering::SeqCst) >= self.children.len()
    }

    /// Called on a child's success; returns `true` if this call made the
    /// task ready (so the caller launches it exactly once).
    pub fn mark_child_ready(&self) -> bool {
        let prev = self.child_ready.fetch_add(1, Ordering::SeqCst);
        prev + 1 == self.children.len()
    }

    /// CAS the `owner` field from 0 to `token`. Returns `false` if another
    /// caller already owns this task's execution (§5 "two concurrent
    /// `exec` attempts on one task are forbidden").
    pub fn try_acquire_owner(&self, token: u64) -> bool {
        self.owner.compare_exchange(0, token, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    pub fn release_owner(&self) {
        self.owner.store(0, Ordering::SeqCst);
    }

    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(p: u16) -> SocketAddr {
        format!("127.0.0.1:{p}").parse().unwrap()
    }

    #[test]
    fn leaf_task_is_ready_immediately() {
        let t = Task::new(1, 0, vec![addr(1)], Bytes::new(), None, vec![]);
        assert!(t.is_ready());
    }

    #[test]
    fn parent_ready_only_after_all_children() {
        let t = Task::new(
            1,
            0,
            vec![addr(1)],
            Bytes::new(),
            None,
            vec![TaskRef { level_idx: 1, task_idx: 0 }, TaskRef { level_idx: 1, task_idx: 1 }],
        );
        assert!(!t.is_ready());
        assert!(!t.mark_child_ready());
        assert!(!t.is_ready());
        assert!(t.mark_child_ready());
        assert!(t.is_ready());
    }

    #[test]
    fn candidate_advance_stops_at_end() {
        let t = Task::new(1, 0, vec![addr(1), addr(2)], Bytes::new(), None, vec![]);
        assert_eq!(t.current_candidate(), Some(addr(1)));
        assert!(t.advance_candidate());
        assert_eq!(t.current_candidate(), Some(addr(2)));
        assert!(!t.advance_candidate());
        assert_eq!(t.current_candidate(), Some(addr(2)));
    }

    #[test]
    fn owner_cas_forbids_concurrent_exec() {
        let t = Task::new(1, 0, vec![addr(1)], Bytes::new(), None, vec![]);
        assert!(t.try_acquire_owner(7));
        assert!(!t.try_acquire_owner(8));
        t.release_owner();
        assert!(t.try_acquire_owner(8));
    }
}
