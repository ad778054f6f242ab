//! Cluster-wide metadata transactions (C3): ordered redo/undo/commit logs
//! plus redo/undo RPC actions fanned out to remote vnodes, grounded on
//! `mndDb.c`'s use of `mndTransCreate`/`mndTransAppendRedolog`/
//! `mndTransAppendRedoAction`/`mndTransPrepare`.
//!
//! The teacher's single-node ACID transaction stack (2PL, MVCC, WAL,
//! deadlock detection, 2PC, OCC) lived here too, but SPEC_FULL.md §1
//! places the on-disk WAL and single-row ACID semantics out of scope —
//! C3 only ever mutates `crate::metastore` rows under the cluster
//! transaction's own redo/undo log, so that stack had no caller left.

pub mod cluster;

pub use cluster::{
    Action, ActionOutcome, ActionTarget, ClusterTransaction, ClusterTransactionManager,
    LogEntry, LogKind, TransactionPolicy, TransactionState,
};
