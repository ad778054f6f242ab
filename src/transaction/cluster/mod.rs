//! Cluster metadata transaction manager (C3): ordered redo/undo/commit logs
//! plus redo/undo RPC actions dispatched against vnodes, grounded on
//! `mndDb.c`'s use of `mndTransCreate`/`mndTransAppendRedolog`/
//! `mndTransAppendRedoAction`/`mndTransPrepare`.
//!
//! This is distinct from [`crate::transaction::manager::TransactionManager`],
//! which provides single-node ACID transactions (2PL + MVCC) over local
//! table rows; the cluster transaction manager instead mutates
//! `crate::metastore` rows and fans out RPC actions to remote vnodes.

pub mod action;
pub mod log;
pub mod manager;

pub use action::{Action, ActionOutcome, ActionTarget};
pub use log::{LogEntry, LogKind};
pub use manager::{ClusterTransaction, ClusterTransactionManager, TransactionPolicy, TransactionState};
