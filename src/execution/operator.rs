//! The physical operator trait and the three-phase blocking-operator state
//! machine, grounded on the original `executorimpl.h`/`executorMain.c`
//! (`pRoot->exec`, `OPTR_EXEC_DONE` et al.) and expressed, per DESIGN.md, as
//! a `Box<dyn Operator>` trait object tree rather than virtual dispatch.

use std::time::Duration;

use crate::error::DbError;
use crate::execution::block::DataBlock;
use crate::Result;

/// Phase of a blocking operator (aggregate, interval, sort/merge), per
/// SPEC_FULL.md §4.4: "Any blocking operator transitions through three
/// phases: IN-EXECUTING -> RES-TO-RETURN -> DONE."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStatus {
    Executing,
    ResToReturn,
    Done,
}

/// The result of one `pull` call. `Pending` preserves the original mock
/// executor's `(None, useconds > 0)` "come back later" signal as a distinct
/// case from `Done`, resolving SPEC_FULL.md's Open Question explicitly
/// rather than overloading `Option` (see DESIGN.md).
pub enum PullOutcome {
    Ready { block: DataBlock, new_group: bool },
    Pending(Duration),
    Done,
}

/// One node in the physical operator tree. Every operator — leaf scan or
/// internal aggregate/window/project — implements `pull`; suspension only
/// happens inside `Exchange::pull` and at the data-sink boundary (§5).
pub trait Operator: Send {
    /// Pull one block. Returns `PullOutcome::Done` at end-of-stream.
    fn pull(&mut self) -> Result<PullOutcome>;

    /// Number of output columns this operator produces, used by parents to
    /// size their own output blocks.
    fn output_columns(&self) -> usize;

    /// Cooperative cancellation checkpoint. Implementations should call
    /// this at each iteration boundary inside `pull` and return
    /// `DbError::QueryCancelled` immediately when it returns `true` (§5
    /// "Cancellation").
    fn is_killed(&self) -> bool {
        false
    }

    /// Per-operator cleanup, called once after the tree is done or
    /// dropped early. Default no-op; spillable operators (aggregate, sort)
    /// override this to release paged buffers.
    fn close(&mut self) {}
}

/// Helper for blocking operators: checks the kill flag and turns it into a
/// `QueryCancelled` error, matching every operator's cancellation
/// checkpoint.
pub fn check_killed(killed: bool) -> Result<()> {
    if killed {
        Err(DbError::QueryCancelled)
    } else {
        Ok(())
    }
}
