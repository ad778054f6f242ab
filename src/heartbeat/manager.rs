//! Per-cluster heartbeat manager, grounded on SPEC_FULL.md §3 "Heartbeat
//! batch" / original `clientHb.c` `appHbMgrInit`/`hbMgrInit`/
//! `hbRegisterConn`.
//!
//! Each cluster a client has connected to gets its own `ClusterHbManager`
//! holding the set of active connections and, per `(connId, hbType)`, the
//! last known DB version map used to decide which DBs need a refresh
//! attached to the next gather pass (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

/// Heartbeat categories a connection can register for, per SPEC_FULL.md
/// §3's "(connId, hbType)" keying and §4.8's "per-hb-type handler". Only
/// `Query` is wired to a request builder in this crate; `Stable` tracks the
/// documented Open Question (§9 "STBINFO heartbeat gap").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HbType {
    Query,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub conn_id: u64,
    pub hb_type: HbType,
}

/// Per-connection state the gather pass reads: the DB-version map last
/// acknowledged by this connection, used to compute which DBs are
/// "expired" (stale relative to the catalog) and need a fresh layout
/// attached to the outbound batch request.
#[derive(Debug, Clone, Default)]
pub struct ConnInfo {
    pub known_db_versions: HashMap<String, i32>,
}

/// One cluster's heartbeat state: active connection ids plus their
/// per-hb-type info records.
#[derive(Default)]
pub struct ClusterHbManager {
    active_connections: RwLock<Vec<u64>>,
    conn_info: DashMap<ConnKey, ConnInfo>,
}

impl ClusterHbManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_conn(&self, conn_id: u64) {
        let mut active = self.active_connections.write();
        if !active.contains(&conn_id) {
            active.push(conn_id);
        }
    }

    pub fn unregister_conn(&self, conn_id: u64) {
        self.active_connections.write().retain(|id| *id != conn_id);
        self.conn_info.retain(|k, _| k.conn_id != conn_id);
    }

    pub fn active_connections(&self) -> Vec<u64> {
        self.active_connections.read().clone()
    }

    pub fn has_active_connections(&self) -> bool {
        !self.active_connections.read().is_empty()
    }

    pub fn conn_info(&self, key: ConnKey) -> ConnInfo {
        self.conn_info.get(&key).map(|e| e.value().clone()).unwrap_or_default()
    }

    pub fn set_known_versions(&self, key: ConnKey, versions: HashMap<String, i32>) {
        self.conn_info.entry(key).or_default().known_db_versions = versions;
    }

    /// Failure path: an OOM or malformed batch clears this connection's
    /// aggregated state so the next tick rebuilds it from scratch (§4.8
    /// "Failure semantics").
    pub fn clear_aggregation(&self, key: ConnKey) {
        self.conn_info.remove(&key);
    }
}

/// Registry of per-cluster heartbeat managers, keyed by cluster key
/// (typically a cluster id or mnode endpoint string). Guarded by its own
/// lock, distinct from the lock on any individual `ClusterHbManager`
/// (§5 "Per-cluster heartbeat manager is guarded by one lock; the global
/// heartbeat manager list is guarded by a separate lock").
#[derive(Default, Clone)]
pub struct HeartbeatManagerRegistry {
    managers: Arc<DashMap<String, Arc<ClusterHbManager>>>,
}

impl HeartbeatManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, cluster_key: &str) -> Arc<ClusterHbManager> {
        Arc::clone(
            self.managers
                .entry(cluster_key.to_string())
                .or_insert_with(|| Arc::new(ClusterHbManager::new()))
                .value(),
        )
    }

    pub fn get(&self, cluster_key: &str) -> Option<Arc<ClusterHbManager>> {
        self.managers.get(cluster_key).map(|e| Arc::clone(e.value()))
    }

    /// Clusters with at least one active connection — the gather pass's
    /// iteration set (§4.8 step 2).
    pub fn clusters_with_active_connections(&self) -> Vec<String> {
        self.managers
            .iter()
            .filter(|e| e.value().has_active_connections())
            .map(|e| e.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_clears_connections() {
        let mgr = ClusterHbManager::new();
        mgr.register_conn(1);
        mgr.register_conn(2);
        assert!(mgr.has_active_connections());
        mgr.unregister_conn(1);
        assert_eq!(mgr.active_connections(), vec![2]);
    }

    #[test]
    fn registry_tracks_only_active_clusters() {
        let registry = HeartbeatManagerRegistry::new();
        let m1 = registry.get_or_create("cluster-a");
        m1.register_conn(1);
        registry.get_or_create("cluster-b"); // no connections

        let active = registry.clusters_with_active_connections();
        assert_eq!(active, vec!["cluster-a".to_string()]);
    }
}
