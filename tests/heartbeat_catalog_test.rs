//! Integration test for spec.md §8 scenario 6, exercised through the
//! crate's public `heartbeat` and `catalog` APIs.

use bytes::Bytes;
use rusty_db::catalog::{Catalog, DbVgroupLayout, EndpointSet, VgroupInfo};
use rusty_db::heartbeat::{encode_db_info_entries, BatchTransport, HeartbeatManagerRegistry};
use rusty_db::Result;
use tokio::sync::Mutex as AsyncMutex;

fn d2_layout(version: i32) -> DbVgroupLayout {
    DbVgroupLayout {
        db_name: "d2".into(),
        db_uid: 2002,
        vgroup_version: version,
        vgroups: vec![VgroupInfo {
            vgroup_id: 1,
            hash_begin: 0,
            hash_end: u32::MAX,
            epset: EndpointSet { endpoints: vec!["127.0.0.1:6030".parse().unwrap()] },
        }],
    }
}

/// Plays the role of the mnode: always answers a batch request with the
/// server-side catalog's current layout for `d2`.
struct MnodeTransport {
    server_catalog: Catalog,
}

#[async_trait::async_trait]
impl BatchTransport for MnodeTransport {
    async fn send_batch(&self, _cluster_key: &str, _request: Bytes) -> Result<Bytes> {
        let layout = self.server_catalog.vgroups().get("d2").expect("server-side d2 inserted before tick");
        Ok(encode_db_info_entries(&[layout]))
    }
}

/// Scenario 6: starting from an empty client-side catalog, a DB inserted
/// server-side becomes visible in the client's catalog — with matching
/// vgVersion and uid — after the next heartbeat tick.
#[tokio::test]
async fn heartbeat_tick_delivers_catalog_refresh_for_new_db() {
    let registry = HeartbeatManagerRegistry::new();
    let manager = registry.get_or_create("cluster1");
    manager.register_conn(1);

    let client_catalog = Catalog::new();
    assert!(client_catalog.vgroups().get("d2").is_none(), "catalog starts empty");

    let server_catalog = Catalog::new();
    server_catalog.vgroups().apply(d2_layout(7));

    let transport = MnodeTransport { server_catalog };
    let lock = AsyncMutex::new(());

    let ticked = rusty_db::heartbeat::run_tick(&registry, &client_catalog, &transport, &lock).await;
    assert_eq!(ticked, 1);

    let refreshed = client_catalog.vgroups().get("d2").expect("d2 must appear after the tick");
    assert_eq!(refreshed.vgroup_version, 7);
    assert_eq!(refreshed.db_uid, 2002);
}
