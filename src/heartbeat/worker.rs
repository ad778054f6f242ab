//! Background heartbeat loop, grounded on SPEC_FULL.md §4.8 / original
//! `clientHb.c` `hbThreadFunc`/`hbCreateThread`/`hbStopThread`.
//!
//! "A single background worker loops at a fixed interval (1.5s). Per
//! tick: (1) acquire the global heartbeat lock, (2) for each per-cluster
//! manager with >=1 active connection [...] push into a batch request,
//! (3) serialize and async-send the batch [...], (4) release the lock,
//! sleep the interval."

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;

use crate::catalog::Catalog;
use crate::error::DbError;
use crate::heartbeat::dbinfo::{decode_db_info_entries, encode_db_info_entries, apply_db_info};
use crate::heartbeat::manager::{ClusterHbManager, ConnKey, HbType, HeartbeatManagerRegistry};
use crate::Result;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1500);

/// Sends a serialized batch request for one cluster and returns the raw
/// response payload. Ownership of the serialized bytes transfers to this
/// call (§4.8 step 3 "Payload ownership transfers to the RPC layer");
/// abstracted exactly like every other network boundary in this crate so
/// the loop is testable without a live transport.
#[async_trait::async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send_batch(&self, cluster_key: &str, request: Bytes) -> Result<Bytes>;
}

/// Build one cluster's outbound batch request: for every active
/// connection, attach the DB-info entries the catalog believes are
/// expired relative to what that connection last acknowledged (§4.8
/// step 2's "request builder").
fn build_batch_request(manager: &ClusterHbManager, catalog: &Catalog) -> Bytes {
    let mut all_expired: HashMap<String, i32> = HashMap::new();
    for conn_id in manager.active_connections() {
        let info = manager.conn_info(ConnKey { conn_id, hb_type: HbType::Query });
        for db in catalog.vgroups().expired(&info.known_db_versions) {
            if let Some(layout) = catalog.vgroups().get(&db) {
                all_expired.insert(db, layout.vgroup_version);
            }
        }
    }
    let layouts: Vec<_> = all_expired.keys().filter_map(|db| catalog.vgroups().get(db)).collect();
    encode_db_info_entries(&layouts)
}

/// Drives one tick on behalf of every cluster with active connections,
/// returning the number of clusters a batch was sent for. Kept separate
/// from the sleeping loop so tests can call it directly.
pub async fn run_tick(
    registry: &HeartbeatManagerRegistry,
    catalog: &Catalog,
    transport: &dyn BatchTransport,
    lock: &AsyncMutex<()>,
) -> usize {
    let _guard = lock.lock().await;
    let mut ticked = 0;
    for cluster_key in registry.clusters_with_active_connections() {
        let Some(manager) = registry.get(&cluster_key) else { continue };
        let request = build_batch_request(&manager, catalog);

        match transport.send_batch(&cluster_key, request).await {
            Ok(response) => {
                if let Err(e) = handle_batch_response(&manager, catalog, response) {
                    tracing::warn!(cluster = %cluster_key, error = %e, "dropping malformed heartbeat batch");
                    for conn_id in manager.active_connections() {
                        manager.clear_aggregation(ConnKey { conn_id, hb_type: HbType::Query });
                    }
                }
            }
            Err(e) => {
                // §4.8 failure semantics: drop the batch, clear
                // per-connection aggregation, let the next tick rebuild it.
                tracing::warn!(cluster = %cluster_key, error = %e, "heartbeat batch send failed");
                for conn_id in manager.active_connections() {
                    manager.clear_aggregation(ConnKey { conn_id, hb_type: HbType::Query });
                }
            }
        }
        ticked += 1;
    }
    ticked
}

/// Response callback: deserialize the batch response and dispatch its
/// DB-info entries into the catalog (§4.8 "Response callback"). The
/// `STBINFO` hb type is intentionally unhandled here, matching the
/// documented source gap (SPEC_FULL.md §9).
fn handle_batch_response(manager: &ClusterHbManager, catalog: &Catalog, response: Bytes) -> Result<()> {
    let entries = decode_db_info_entries(response)?;
    for conn_id in manager.active_connections() {
        let mut known = manager.conn_info(ConnKey { conn_id, hb_type: HbType::Query }).known_db_versions;
        for e in &entries {
            known.insert(e.db_name.clone(), e.vgroup_version);
        }
        manager.set_known_versions(ConnKey { conn_id, hb_type: HbType::Query }, known);
    }
    apply_db_info(catalog, entries);
    Ok(())
}

/// The long-running background task (§5 "Background long-running loops
/// [...] each run on a dedicated thread"). Runs until `shutdown` resolves,
/// ticking at `interval` (defaults to [`HEARTBEAT_INTERVAL`] via
/// `HeartbeatConfig::default`, overridable per `crate::config::HeartbeatConfig`).
pub async fn run_loop(
    registry: Arc<HeartbeatManagerRegistry>,
    catalog: Arc<Catalog>,
    transport: Arc<dyn BatchTransport>,
    interval: Duration,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let lock = AsyncMutex::new(());
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&registry, &catalog, transport.as_ref(), &lock).await;
            }
            _ = &mut shutdown => {
                tracing::info!("heartbeat worker shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DbVgroupLayout, EndpointSet, VgroupInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTransport {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BatchTransport for EchoTransport {
        async fn send_batch(&self, _cluster_key: &str, request: Bytes) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request)
        }
    }

    fn layout(version: i32) -> DbVgroupLayout {
        DbVgroupLayout {
            db_name: "d1".into(),
            db_uid: 1,
            vgroup_version: version,
            vgroups: vec![VgroupInfo {
                vgroup_id: 1,
                hash_begin: 0,
                hash_end: u32::MAX,
                epset: EndpointSet { endpoints: vec!["127.0.0.1:6030".parse().unwrap()] },
            }],
        }
    }

    #[tokio::test]
    async fn tick_skips_clusters_without_active_connections() {
        let registry = HeartbeatManagerRegistry::new();
        registry.get_or_create("c1"); // no connections registered
        let catalog = Catalog::new();
        let transport = EchoTransport { calls: AtomicUsize::new(0) };
        let lock = AsyncMutex::new(());

        let ticked = run_tick(&registry, &catalog, &transport, &lock).await;
        assert_eq!(ticked, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tick_delivers_catalog_refresh_for_active_cluster() {
        let registry = HeartbeatManagerRegistry::new();
        let manager = registry.get_or_create("c1");
        manager.register_conn(42);

        let server_side_catalog = Catalog::new();
        server_side_catalog.vgroups().apply(layout(5));

        // The client's local catalog starts empty; the transport plays the
        // role of the mnode, always answering with the current layout.
        let client_catalog = Catalog::new();

        struct ServerEcho {
            server_catalog: Catalog,
        }
        #[async_trait::async_trait]
        impl BatchTransport for ServerEcho {
            async fn send_batch(&self, _cluster_key: &str, _request: Bytes) -> Result<Bytes> {
                let layout = self.server_catalog.vgroups().get("d1").unwrap();
                Ok(encode_db_info_entries(&[layout]))
            }
        }
        let transport = ServerEcho { server_catalog: server_side_catalog };
        let lock = AsyncMutex::new(());

        assert!(client_catalog.vgroups().get("d1").is_none());
        run_tick(&registry, &client_catalog, &transport, &lock).await;
        let refreshed = client_catalog.vgroups().get("d1").expect("catalog refreshed from heartbeat");
        assert_eq!(refreshed.vgroup_version, 5);
    }

    #[tokio::test]
    async fn send_failure_clears_aggregation_without_panicking() {
        struct FailingTransport;
        #[async_trait::async_trait]
        impl BatchTransport for FailingTransport {
            async fn send_batch(&self, _cluster_key: &str, _request: Bytes) -> Result<Bytes> {
                Err(DbError::Network("connection reset".into()))
            }
        }
        let registry = HeartbeatManagerRegistry::new();
        let manager = registry.get_or_create("c1");
        manager.register_conn(1);
        manager.set_known_versions(ConnKey { conn_id: 1, hb_type: HbType::Query }, HashMap::from([("d1".into(), 2)]));

        let catalog = Catalog::new();
        let lock = AsyncMutex::new(());
        run_tick(&registry, &catalog, &FailingTransport, &lock).await;

        assert!(manager.conn_info(ConnKey { conn_id: 1, hb_type: HbType::Query }).known_db_versions.is_empty());
    }
}
