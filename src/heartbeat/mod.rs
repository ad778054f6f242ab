//! Client heartbeat pipeline (C9): aggregates per-connection state across
//! every cluster the client has connected to, batches heartbeat requests,
//! and routes responses back into the catalog that drives query routing
//! decisions. Grounded on SPEC_FULL.md §4.8 / original `clientHb.c`.

pub mod dbinfo;
pub mod manager;
pub mod worker;

pub use dbinfo::{apply_db_info, decode_db_info_entries, encode_db_info_entries};
pub use manager::{ClusterHbManager, ConnInfo, ConnKey, HbType, HeartbeatManagerRegistry};
pub use worker::{run_loop, run_tick, BatchTransport, HEARTBEAT_INTERVAL};
