//! Ordered redo/undo/commit log raws, grounded on `mndDb.c`'s
//! `mndTransAppendRedolog`/`mndTransAppendUndolog`/`mndTransAppendCommitlog`,
//! each of which appends one `SSdbRaw` tagged with the row's target status
//! (CREATING/UPDATING/DROPPING while preparing, READY/DROPPED on commit).

use crate::metastore::row::{SdbObjectType, SdbRaw, SdbStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Redo,
    Undo,
    Commit,
}

/// One entry in a transaction's ordered log list.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: LogKind,
    pub obj_type: SdbObjectType,
    pub raw: SdbRaw,
    pub status: SdbStatus,
}

impl LogEntry {
    pub fn new(kind: LogKind, obj_type: SdbObjectType, raw: SdbRaw, status: SdbStatus) -> Self {
        Self { kind, obj_type, raw, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metastore::row::SdbRow;

    #[test]
    fn entry_carries_its_target_status() {
        let row = SdbRow::new(SdbObjectType::Database, b"db1".to_vec(), SdbStatus::Creating, vec![]);
        let raw = SdbRaw::encode(&row);
        let entry = LogEntry::new(LogKind::Redo, SdbObjectType::Database, raw, SdbStatus::Creating);
        assert_eq!(entry.status, SdbStatus::Creating);
        assert_eq!(entry.kind, LogKind::Redo);
    }
}
