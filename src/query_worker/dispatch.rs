//! Query-worker dispatch (C7), grounded on SPEC_FULL.md §4.6: routes each
//! inbound message, keyed by `(query_id, task_id)`, to the right task's
//! lifecycle. The request/response sequencing invariant itself
//! (`last_msg_type_on_response = last_msg_type_sent + 1`) is enforced on
//! the caller side in `scheduler::fetch` via `network::rpc::validate_sequence`
//! — this module owns the per-task state machine the scheduler's requests
//! and fetches drive forward.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::DbError;
use crate::query_worker::task_state::{drop_is_idempotent, WorkerEvent, WorkerTaskState};
use crate::sink::{DataSink, SinkOutput};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerTaskKey {
    pub query_id: u64,
    pub task_id: u64,
}

struct WorkerTask {
    state: WorkerTaskState,
}

/// Per-vnode registry of worker-side tasks, dispatching inbound requests
/// to the right task's state machine and data sink.
pub struct QueryWorker {
    tasks: Mutex<HashMap<WorkerTaskKey, WorkerTask>>,
    sinks: Mutex<HashMap<WorkerTaskKey, DataSink>>,
}

impl QueryWorker {
    pub fn new() -> Self {
        Self { tasks: Mutex::new(HashMap::new()), sinks: Mutex::new(HashMap::new()) }
    }

    /// Handle an inbound `Query` message: create the task in `NotStart` and
    /// immediately transition it to `Executing`.
    pub fn on_query(&self, key: WorkerTaskKey) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let entry = tasks.entry(key).or_insert(WorkerTask { state: WorkerTaskState::NotStart });
        entry.state = entry.state.apply(WorkerEvent::Query)?;
        self.sinks.lock().entry(key).or_insert_with(|| DataSink::new(crate::sink::DEFAULT_MAX_BLOCKS_PER_QUERY));
        Ok(())
    }

    /// Intermediate execution completed: the task has produced all it will
    /// until a `ready`/`fetch` pulls it forward.
    pub fn on_exec_complete(&self, key: WorkerTaskKey) -> Result<()> {
        self.transition(key, WorkerEvent::ExecCompleteIntermediate)
    }

    pub fn on_ready(&self, key: WorkerTaskKey) -> Result<()> {
        self.transition(key, WorkerEvent::Ready)
    }

    pub fn on_fetch_drained(&self, key: WorkerTaskKey) -> Result<()> {
        self.transition(key, WorkerEvent::FetchAllDrained)
    }

    /// Drop is idempotent: a task the worker has never heard of still
    /// reports success, ending in `Freeing` directly.
    pub fn on_drop(&self, key: WorkerTaskKey) -> Result<WorkerTaskState> {
        let mut tasks = self.tasks.lock();
        match tasks.get_mut(&key) {
            None => Ok(drop_is_idempotent(None)),
            Some(task) => {
                task.state = task.state.apply(WorkerEvent::Drop)?;
                task.state = WorkerTaskState::Freeing;
                self.sinks.lock().remove(&key);
                Ok(task.state)
            }
        }
    }

    pub fn state_of(&self, key: WorkerTaskKey) -> Option<WorkerTaskState> {
        self.tasks.lock().get(&key).map(|t| t.state)
    }

    /// Serve one FETCH: pull a block out of the task's sink and, once the
    /// sink reports `query_end`, drive the worker-side task to `Succeed`.
    pub fn fetch_block(&self, key: WorkerTaskKey) -> Result<SinkOutput> {
        let output = {
            let sinks = self.sinks.lock();
            let sink = sinks
                .get(&key)
                .ok_or_else(|| DbError::InvalidInput(format!("unknown task {key:?}")))?;
            sink.get_block()
        };
        if output.query_end {
            self.on_fetch_drained(key)?;
        }
        Ok(output)
    }

    fn transition(&self, key: WorkerTaskKey, event: WorkerEvent) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(&key)
            .ok_or_else(|| DbError::InvalidInput(format!("unknown task {key:?}")))?;
        task.state = task.state.apply(event)?;
        Ok(())
    }
}

impl Default for QueryWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> WorkerTaskKey {
        WorkerTaskKey { query_id: 1, task_id: 1 }
    }

    #[test]
    fn full_lifecycle_reaches_succeed() {
        let qw = QueryWorker::new();
        qw.on_query(key()).unwrap();
        assert_eq!(qw.state_of(key()), Some(WorkerTaskState::Executing));
        qw.on_exec_complete(key()).unwrap();
        assert_eq!(qw.state_of(key()), Some(WorkerTaskState::PartialSucceed));
        qw.on_fetch_drained(key()).unwrap();
        assert_eq!(qw.state_of(key()), Some(WorkerTaskState::Succeed));
    }

    #[test]
    fn ready_before_exec_complete_rejected() {
        let qw = QueryWorker::new();
        qw.on_query(key()).unwrap();
        // Executing has no edge for `ready`; only PartialSucceed/Succeed do.
        assert!(qw.on_ready(key()).is_err());
    }

    #[test]
    fn drop_on_unknown_task_is_idempotent() {
        let qw = QueryWorker::new();
        let state = qw.on_drop(WorkerTaskKey { query_id: 99, task_id: 1 }).unwrap();
        assert_eq!(state, WorkerTaskState::Freeing);
    }

    #[test]
    fn drop_on_active_task_ends_freeing() {
        let qw = QueryWorker::new();
        qw.on_query(key()).unwrap();
        let state = qw.on_drop(key()).unwrap();
        assert_eq!(state, WorkerTaskState::Freeing);
    }

    #[test]
    fn fetch_block_drains_sink_and_completes_task() {
        use crate::execution::block::DataBlock;

        let qw = QueryWorker::new();
        qw.on_query(key()).unwrap();
        qw.on_exec_complete(key()).unwrap();

        {
            let sinks = qw.sinks.lock();
            let sink = sinks.get(&key()).unwrap();
            sink.put(DataBlock::new(1)).unwrap();
            sink.end_put(0);
        }

        let out = qw.fetch_block(key()).unwrap();
        assert!(out.block.is_some());
        assert!(out.query_end);
        assert_eq!(qw.state_of(key()), Some(WorkerTaskState::Succeed));
    }

    #[test]
    fn fetch_block_on_unknown_task_errors() {
        let qw = QueryWorker::new();
        assert!(qw.fetch_block(WorkerTaskKey { query_id: 5, task_id: 5 }).is_err());
    }
}
