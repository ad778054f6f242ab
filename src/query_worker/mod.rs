//! Query-worker dispatch (C7): the per-vnode side of the scheduler/worker
//! protocol, grounded on SPEC_FULL.md §4.6.

pub mod dispatch;
pub mod task_state;

pub use dispatch::{QueryWorker, WorkerTaskKey};
pub use task_state::{drop_is_idempotent, WorkerEvent, WorkerTaskState};
