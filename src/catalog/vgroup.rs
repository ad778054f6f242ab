// Cluster vgroup layout cache.
//
// Grounded on the original `clientHb.c` `hbProcessDBInfoRsp` handler: the
// heartbeat response carries a packed array of per-database vgroup layouts
// (db name, uid, vgVersion, vgNum, then one entry per vgroup holding its id,
// hash range and endpoint set). A negative `vgVersion` means the database
// was dropped and its entry should be removed rather than replaced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// One storage shard's reachable endpoints. The first entry is the current
/// leader hint; callers retry the remainder on connection failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointSet {
    pub endpoints: Vec<SocketAddr>,
}

impl EndpointSet {
    pub fn leader(&self) -> Option<SocketAddr> {
        self.endpoints.first().copied()
    }
}

/// A contiguous hash-range bucket mapped to one vgroup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VgroupInfo {
    pub vgroup_id: i32,
    pub hash_begin: u32,
    pub hash_end: u32,
    pub epset: EndpointSet,
}

/// The full vgroup layout for one database, as last delivered by the
/// heartbeat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbVgroupLayout {
    pub db_name: String,
    pub db_uid: u64,
    pub vgroup_version: i32,
    pub vgroups: Vec<VgroupInfo>,
}

impl DbVgroupLayout {
    /// Locate the vgroup responsible for a given hash value, mirroring the
    /// linear hash-range scan the client uses before issuing a sub-query.
    pub fn vgroup_for_hash(&self, hash: u32) -> Option<&VgroupInfo> {
        self.vgroups
            .iter()
            .find(|vg| hash >= vg.hash_begin && hash <= vg.hash_end)
    }
}

/// Cluster-indexed cache of database vgroup layouts, refreshed exclusively
/// by the heartbeat pipeline (`crate::heartbeat`). Query planning reads
/// through this cache rather than contacting the management node directly.
#[derive(Clone, Default)]
pub struct VgroupCache {
    layouts: Arc<RwLock<HashMap<String, DbVgroupLayout>>>,
}

impl VgroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, db_name: &str) -> Option<DbVgroupLayout> {
        self.layouts.read().get(db_name).cloned()
    }

    /// Apply one heartbeat-delivered entry. A negative `vgroup_version`
    /// means the database has been dropped cluster-side; any other version
    /// replaces the cached layout wholesale (vgroup layouts are delivered
    /// complete, never as a diff).
    pub fn apply(&self, layout: DbVgroupLayout) {
        let mut guard = self.layouts.write();
        if layout.vgroup_version < 0 {
            guard.remove(&layout.db_name);
        } else {
            guard.insert(layout.db_name.clone(), layout);
        }
    }

    pub fn remove(&self, db_name: &str) {
        self.layouts.write().remove(db_name);
    }

    /// Databases whose cached layout is stale relative to `known_versions`
    /// (db_name -> last-applied version), used by the heartbeat gather pass
    /// to decide which DBs need a refresh request attached.
    pub fn expired(&self, known_versions: &HashMap<String, i32>) -> Vec<String> {
        let guard = self.layouts.read();
        known_versions
            .iter()
            .filter(|(db, ver)| {
                guard
                    .get(*db)
                    .map(|layout| layout.vgroup_version != **ver)
                    .unwrap_or(true)
            })
            .map(|(db, _)| db.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(db: &str, version: i32) -> DbVgroupLayout {
        DbVgroupLayout {
            db_name: db.to_string(),
            db_uid: 1,
            vgroup_version: version,
            vgroups: vec![VgroupInfo {
                vgroup_id: 2,
                hash_begin: 0,
                hash_end: u32::MAX,
                epset: EndpointSet { endpoints: vec!["127.0.0.1:6030".parse().unwrap()] },
            }],
        }
    }

    #[test]
    fn negative_version_removes_entry() {
        let cache = VgroupCache::new();
        cache.apply(sample("db1", 1));
        assert!(cache.get("db1").is_some());

        cache.apply(sample("db1", -1));
        assert!(cache.get("db1").is_none());
    }

    #[test]
    fn vgroup_for_hash_finds_range() {
        let layout = sample("db1", 1);
        let vg = layout.vgroup_for_hash(500).unwrap();
        assert_eq!(vg.vgroup_id, 2);
    }
}
