//! Cluster transaction lifecycle, grounded on `mndDb.c`'s
//! `mndTransPrepare`/`mndTransExecute` state walk: write redo-log raws into
//! the metastore, dispatch redo-actions in order, on any non-acceptable
//! failure either roll back (undo-log + undo-actions) or retry depending on
//! the transaction's policy, then on success apply commit-log raws.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::DbError;
use crate::metastore::{SdbObjectType, SdbRow, SdbTableSet};
use crate::Result;

use super::action::{Action, ActionOutcome};
use super::log::{LogEntry, LogKind};

/// How a transaction responds to a non-acceptable action failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPolicy {
    /// Stop forward progress, apply undo-log raws, best-effort fire
    /// undo-actions against already-succeeded targets.
    RollbackOnFailure,
    /// Keep re-sending the failed action until it succeeds or the
    /// transaction is administratively aborted.
    RetryUntilSucceed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Preparing,
    Prepared,
    Executing,
    Committing,
    Rollbacking,
    Finished,
    Failed,
}

/// Dispatches one action to its remote target and returns the response
/// code. Implemented by the real RPC layer (`network::rpc::RpcShim`-backed)
/// or by a deterministic in-memory stub in tests.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &Action) -> Result<i32>;
}

/// One in-flight cluster transaction.
pub struct ClusterTransaction {
    pub id: u64,
    pub policy: TransactionPolicy,
    state: Mutex<TransactionState>,
    redo_logs: Vec<LogEntry>,
    undo_logs: Vec<LogEntry>,
    commit_logs: Vec<LogEntry>,
    redo_actions: Vec<Action>,
    undo_actions: Vec<Action>,
}

impl ClusterTransaction {
    pub fn new(id: u64, policy: TransactionPolicy) -> Self {
        Self {
            id,
            policy,
            state: Mutex::new(TransactionState::Preparing),
            redo_logs: Vec::new(),
            undo_logs: Vec::new(),
            commit_logs: Vec::new(),
            redo_actions: Vec::new(),
            undo_actions: Vec::new(),
        }
    }

    pub fn append_redo_log(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.kind, LogKind::Redo);
        self.redo_logs.push(entry);
    }

    pub fn append_undo_log(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.kind, LogKind::Undo);
        self.undo_logs.push(entry);
    }

    pub fn append_commit_log(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.kind, LogKind::Commit);
        self.commit_logs.push(entry);
    }

    pub fn append_redo_action(&mut self, action: Action) {
        self.redo_actions.push(action);
    }

    pub fn append_undo_action(&mut self, action: Action) {
        self.undo_actions.push(action);
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }
}

/// Owns the metastore and drives transactions against it.
pub struct ClusterTransactionManager {
    next_id: AtomicU64,
    tables: Arc<SdbTableSet>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl ClusterTransactionManager {
    pub fn new(tables: Arc<SdbTableSet>, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self { next_id: AtomicU64::new(1), tables, dispatcher }
    }

    pub fn create_transaction(&self, policy: TransactionPolicy) -> ClusterTransaction {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ClusterTransaction::new(id, policy)
    }

    fn apply_log(&self, entry: &LogEntry) -> Result<()> {
        let row = entry.raw.decode(entry.obj_type)?;
        let table = self.tables.table(entry.obj_type);
        if entry.status == crate::metastore::row::SdbStatus::Dropped {
            table.remove(&row.key);
        } else {
            table.upsert(row);
        }
        Ok(())
    }

    /// Drives `prepare` → dispatch redo-actions → commit or rollback,
    /// mirroring `mndTransPrepare` followed by the transaction worker's
    /// execution loop (collapsed here into one synchronous call since this
    /// crate has no separate commit-worker thread pool — see DESIGN.md).
    pub async fn execute(&self, txn: &mut ClusterTransaction) -> Result<()> {
        *txn.state.lock() = TransactionState::Preparing;
        for entry in &txn.redo_logs {
            self.apply_log(entry)?;
        }
        *txn.state.lock() = TransactionState::Prepared;

        *txn.state.lock() = TransactionState::Executing;
        let mut succeeded: Vec<&Action> = Vec::new();
        for action in &txn.redo_actions {
            loop {
                let outcome = self.dispatch_one(action).await;
                match outcome {
                    Ok(o) if o.accepted => {
                        succeeded.push(action);
                        break;
                    }
                    Ok(o) => {
                        warn!(code = o.code, txn_id = txn.id, "redo action rejected");
                        if self.handle_failure(txn, &succeeded).await? {
                            continue; // retry policy: resend same action
                        } else {
                            return Err(DbError::Transaction(format!(
                                "cluster transaction {} rolled back after action failure (code {})",
                                txn.id, o.code
                            )));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, txn_id = txn.id, "redo action dispatch error");
                        if self.handle_failure(txn, &succeeded).await? {
                            continue;
                        } else {
                            return Err(e);
                        }
                    }
                }
            }
        }

        *txn.state.lock() = TransactionState::Committing;
        for entry in &txn.commit_logs {
            self.apply_log(entry)?;
        }
        *txn.state.lock() = TransactionState::Finished;
        info!(txn_id = txn.id, "cluster transaction committed");
        Ok(())
    }

    async fn dispatch_one(&self, action: &Action) -> Result<ActionOutcome> {
        let code = self.dispatcher.dispatch(action).await?;
        Ok(ActionOutcome::from_action(action, code))
    }

    /// Returns `Ok(true)` if the caller should retry the same action
    /// (`RetryUntilSucceed` policy), `Ok(false)` if rollback completed and
    /// the caller should surface the failure.
    async fn handle_failure(&self, txn: &mut ClusterTransaction, succeeded: &[&Action]) -> Result<bool> {
        match txn.policy {
            TransactionPolicy::RetryUntilSucceed => Ok(true),
            TransactionPolicy::RollbackOnFailure => {
                *txn.state.lock() = TransactionState::Rollbacking;
                for entry in &txn.undo_logs {
                    self.apply_log(entry)?;
                }
                for action in &txn.undo_actions {
                    let _ = self.dispatcher.dispatch(action).await;
                }
                let _ = succeeded; // best-effort; original does not re-undo succeeded redo actions individually
                *txn.state.lock() = TransactionState::Failed;
                Ok(false)
            }
        }
    }
}
