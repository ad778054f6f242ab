//! Per-object-type table registry, grounded on `mndDb.c`'s
//! `sdbSetTable` pattern of registering insert/update/delete hooks per
//! object type, and on the acquire/release/scan-cursor contract of
//! `mndAcquireDb`/`mndReleaseDb`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DbError;
use crate::Result;

use super::row::{SdbObjectType, SdbRow};

/// One object-type's row store: a keyed map of acquire/release-counted
/// rows, guarded by a single read-write lock (the original used per-table
/// hash locks; `parking_lot::RwLock<HashMap<..>>` is the direct Rust
/// analogue at this scale).
pub struct SdbTable {
    obj_type: SdbObjectType,
    rows: RwLock<HashMap<Vec<u8>, SdbRow>>,
}

impl SdbTable {
    pub fn new(obj_type: SdbObjectType) -> Self {
        Self { obj_type, rows: RwLock::new(HashMap::new()) }
    }

    pub fn obj_type(&self) -> SdbObjectType {
        self.obj_type
    }

    /// Insert or replace a row (called by the transaction manager's commit
    /// step — never directly by application code).
    pub fn upsert(&self, row: SdbRow) {
        self.rows.write().insert(row.key.clone(), row);
    }

    pub fn remove(&self, key: &[u8]) -> Option<SdbRow> {
        self.rows.write().remove(key)
    }

    /// Acquire a row by key, bumping its reference count. Mirrors
    /// `mndAcquireDb`: callers must `release` exactly once per `acquire`.
    pub fn acquire(&self, key: &[u8]) -> Result<SdbRow> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(key)
            .ok_or_else(|| DbError::NotFound(format!("sdb row {:?} not found", String::from_utf8_lossy(key))))?;
        row.acquire();
        Ok(row.clone())
    }

    pub fn release(&self, key: &[u8]) {
        if let Some(row) = self.rows.write().get_mut(key) {
            row.release();
        }
    }

    pub fn size(&self) -> usize {
        self.rows.read().len()
    }

    /// Snapshot scan: the original's cursor-based `fetch`/`cancel_fetch`
    /// pair collapses to a point-in-time clone here since Rust's borrow
    /// checker makes a live cursor over a mutable map awkward to expose
    /// across the FFI-free async boundary this crate runs in; callers that
    /// need per-row locking during a scan should `acquire` individually.
    pub fn scan(&self) -> Vec<SdbRow> {
        self.rows.read().values().cloned().collect()
    }
}

/// The full set of metadata tables, one per object type, matching
/// `mndInit`'s per-type `sdbSetTable` registration calls.
pub struct SdbTableSet {
    tables: HashMap<SdbObjectType, Arc<SdbTable>>,
}

impl SdbTableSet {
    pub fn new() -> Self {
        use SdbObjectType::*;
        let mut tables = HashMap::new();
        for t in [Database, Vgroup, User, Connection] {
            tables.insert(t, Arc::new(SdbTable::new(t)));
        }
        Self { tables }
    }

    pub fn table(&self, obj_type: SdbObjectType) -> Arc<SdbTable> {
        self.tables
            .get(&obj_type)
            .cloned()
            .expect("all object types are registered in SdbTableSet::new")
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|t| t.size()).sum()
    }
}

impl Default for SdbTableSet {
    fn default() -> Self {
        Self::new()
    }
}
