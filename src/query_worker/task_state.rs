//! Worker-side task state machine, grounded on SPEC_FULL.md §4.6
//! ("Routes each incoming message ... to the right task lifecycle"),
//! the `qwtTaskStatus` transition table on a vnode's query worker.

use crate::error::DbError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerTaskState {
    NotStart,
    Executing,
    PartialSucceed,
    Succeed,
    Failed,
    Cancelling,
    Cancelled,
    Dropping,
    Freeing,
}

/// The events a worker-side task responds to, each driving exactly one
/// transition edge from SPEC_FULL.md §4.6's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Query,
    ExecCompleteIntermediate,
    Ready,
    FetchAllDrained,
    Cancel,
    Drop,
}

impl WorkerTaskState {
    /// Apply one event, returning the resulting state or rejecting an
    /// event that has no edge out of the current state.
    pub fn apply(self, event: WorkerEvent) -> Result<WorkerTaskState> {
        use WorkerEvent::*;
        use WorkerTaskState::*;

        // `drop` is valid from any non-terminal state regardless of what
        // else is going on; model it before the per-state match.
        if matches!(event, Drop) {
            return match self {
                Cancelled | Failed | Succeed | Freeing => {
                    Err(DbError::InvalidInput(format!("cannot drop a terminal task in state {self:?}")))
                }
                _ => Ok(Dropping),
            };
        }

        match (self, event) {
            (NotStart, Query) => Ok(Executing),
            (Executing, ExecCompleteIntermediate) => Ok(PartialSucceed),
            (PartialSucceed, Ready) => Ok(PartialSucceed),
            (Succeed, Ready) => Ok(Succeed),
            (PartialSucceed, FetchAllDrained) => Ok(Succeed),
            (Executing, Cancel) | (PartialSucceed, Cancel) => Ok(Cancelling),
            (Cancelling, _) if matches!(event, ExecCompleteIntermediate | Ready | FetchAllDrained) => {
                Ok(Cancelled)
            }
            (state, event) => Err(DbError::InvalidInput(format!(
                "no transition for event {event:?} from state {state:?}"
            ))),
        }
    }
}

/// Idempotent drop: dropping a task that the worker has already forgotten
/// about (or never started) is success, not an error, per SPEC_FULL.md
/// §4.6's "worker-side idempotent drop succeeds even if task doesn't
/// exist" invariant.
pub fn drop_is_idempotent(existing: Option<WorkerTaskState>) -> WorkerTaskState {
    match existing {
        None => WorkerTaskState::Freeing,
        Some(WorkerTaskState::Freeing) => WorkerTaskState::Freeing,
        Some(_) => WorkerTaskState::Dropping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerEvent::*;
    use WorkerTaskState::*;

    #[test]
    fn query_moves_notstart_to_executing() {
        assert_eq!(NotStart.apply(Query).unwrap(), Executing);
    }

    #[test]
    fn exec_complete_then_fetch_reaches_succeed() {
        let s = Executing.apply(ExecCompleteIntermediate).unwrap();
        assert_eq!(s, PartialSucceed);
        let s = s.apply(FetchAllDrained).unwrap();
        assert_eq!(s, Succeed);
    }

    #[test]
    fn ready_while_completed_stays_same() {
        assert_eq!(PartialSucceed.apply(Ready).unwrap(), PartialSucceed);
        assert_eq!(Succeed.apply(Ready).unwrap(), Succeed);
    }

    #[test]
    fn drop_from_any_nonterminal_goes_to_dropping() {
        assert_eq!(NotStart.apply(Drop).unwrap(), Dropping);
        assert_eq!(Executing.apply(Drop).unwrap(), Dropping);
        assert_eq!(PartialSucceed.apply(Drop).unwrap(), Dropping);
    }

    #[test]
    fn drop_from_terminal_state_rejected() {
        assert!(Succeed.apply(Drop).is_err());
        assert!(Cancelled.apply(Drop).is_err());
    }

    #[test]
    fn missing_task_drop_is_idempotent_freeing() {
        assert_eq!(drop_is_idempotent(None), Freeing);
        assert_eq!(drop_is_idempotent(Some(Executing)), Dropping);
    }

    #[test]
    fn invalid_edge_rejected() {
        assert!(NotStart.apply(FetchAllDrained).is_err());
    }
}
