//! Profile / connection registry (C10): server-side per-connection cache,
//! keepalive, kill-connection/kill-query. Grounded on SPEC_FULL.md §3
//! "Connection record" / §4.9, and the teacher's `session::session_manager`
//! lifecycle-cache shape, generalized from a session-migration registry to
//! the spec's simpler TTL-bucketed connection cache.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::DbError;
use crate::Result;

/// Bound on the recent-query ring kept per connection (§3 "a bounded array
/// of recent query descriptors").
pub const MAX_RECENT_QUERIES: usize = 20;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Minimal descriptor of one query a connection ran, kept for
/// introspection (§4.9 "Introspection operations expose rows over
/// connection and query lists").
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub query_id: u64,
    pub sql: String,
    pub started_at_ms: u64,
}

/// What the RPC layer hands the registry on `CONNECT`/`HEARTBEAT` (§3
/// "Connection record"): everything needed to create or validate a record
/// without this module depending on the transport crate directly.
#[derive(Debug, Clone)]
pub struct RpcConnInfo {
    pub user: String,
    pub app: String,
    pub pid: u32,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub is_super_user: bool,
}

pub struct ConnectionRecord {
    pub conn_id: u64,
    pub user: String,
    pub app: String,
    pub pid: u32,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub is_super_user: bool,
    killed: std::sync::atomic::AtomicBool,
    pub login_ts_ms: u64,
    last_access_ms: std::sync::atomic::AtomicU64,
    ref_count: std::sync::atomic::AtomicU64,
    current_query_id: std::sync::atomic::AtomicU64,
    recent_queries: RwLock<VecDeque<QueryDescriptor>>,
}

impl ConnectionRecord {
    fn new(conn_id: u64, info: RpcConnInfo, start_ts_ms: u64) -> Self {
        Self {
            conn_id,
            user: info.user,
            app: info.app,
            pid: info.pid,
            client_ip: info.client_ip,
            client_port: info.client_port,
            is_super_user: info.is_super_user,
            killed: std::sync::atomic::AtomicBool::new(false),
            login_ts_ms: start_ts_ms,
            last_access_ms: std::sync::atomic::AtomicU64::new(start_ts_ms),
            ref_count: std::sync::atomic::AtomicU64::new(0),
            current_query_id: std::sync::atomic::AtomicU64::new(0),
            recent_queries: RwLock::new(VecDeque::with_capacity(MAX_RECENT_QUERIES)),
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::SeqCst)
    }

    pub fn current_query_id(&self) -> u64 {
        self.current_query_id.load(Ordering::SeqCst)
    }

    pub fn recent_queries(&self) -> Vec<QueryDescriptor> {
        self.recent_queries.read().iter().cloned().collect()
    }

    fn touch(&self) {
        self.last_access_ms.store(now_ms(), Ordering::SeqCst);
    }
}

impl Clone for QueryDescriptor {
    fn clone(&self) -> Self {
        Self { query_id: self.query_id, sql: self.sql.clone(), started_at_ms: self.started_at_ms }
    }
}

/// An owned, point-in-time copy of a connection record, returned by
/// `get()` so callers don't hold a `DashMap` shard guard while inspecting
/// fields.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub conn_id: u64,
    pub user: String,
    pub app: String,
    pub pid: u32,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub is_super_user: bool,
    pub killed: bool,
    pub login_ts_ms: u64,
    pub last_access_ms: u64,
    pub current_query_id: u64,
    pub recent_queries: Vec<QueryDescriptor>,
}

impl ConnectionSnapshot {
    pub fn is_killed(&self) -> bool {
        self.killed
    }
}

/// TTL-bucketed cache of connection records, keyed by connection id. The
/// "bucket" is expressed as `last_access_ms` plus a caller-driven sweep
/// (`sweep_expired`) rather than a literal hash-ring, matching the cache's
/// observable contract without depending on the teacher's on-disk
/// time-bucket implementation detail.
pub struct ConnectionRegistry {
    connections: DashMap<u64, ConnectionRecord>,
    next_conn_id: AtomicU64,
    ttl: Duration,
}

impl ConnectionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self { connections: DashMap::new(), next_conn_id: AtomicU64::new(1), ttl }
    }

    /// `CONNECT`: allocate a new connection record.
    pub fn create_conn(&self, info: RpcConnInfo, start_ts_ms: u64) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        self.connections.insert(conn_id, ConnectionRecord::new(conn_id, info, start_ts_ms));
        conn_id
    }

    /// Refresh `lastAccess` and increment the reference count, returning
    /// an error if the connection doesn't exist or was killed (§4.9
    /// `acquire`).
    pub fn acquire(&self, conn_id: u64) -> Result<()> {
        let entry = self
            .connections
            .get(&conn_id)
            .ok_or_else(|| DbError::NotFound(format!("connection {conn_id}")))?;
        if entry.is_killed() {
            return Err(DbError::InvalidState(format!("connection {conn_id} was killed")));
        }
        entry.touch();
        entry.ref_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn release(&self, conn_id: u64) {
        if let Some(entry) = self.connections.get(&conn_id) {
            entry.ref_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// `HEARTBEAT`: find an existing connection (validating the client
    /// ip:port hasn't changed) or create a new one, returning its id
    /// either way (§4.9 `heartbeat`).
    pub fn heartbeat(&self, conn_id: Option<u64>, info: RpcConnInfo, now_ts_ms: u64) -> Result<u64> {
        if let Some(id) = conn_id {
            if let Some(entry) = self.connections.get(&id) {
                if entry.client_ip != info.client_ip || entry.client_port != info.client_port {
                    return Err(DbError::InvalidState(format!(
                        "connection {id} endpoint changed from {}:{} to {}:{}",
                        entry.client_ip, entry.client_port, info.client_ip, info.client_port
                    )));
                }
                entry.touch();
                return Ok(id);
            }
        }
        Ok(self.create_conn(info, now_ts_ms))
    }

    pub fn set_current_query(&self, conn_id: u64, query_id: u64, sql: String, started_at_ms: u64) {
        if let Some(entry) = self.connections.get(&conn_id) {
            entry.current_query_id.store(query_id, Ordering::SeqCst);
            let mut recent = entry.recent_queries.write();
            if recent.len() == MAX_RECENT_QUERIES {
                recent.pop_front();
            }
            recent.push_back(QueryDescriptor { query_id, sql, started_at_ms });
        }
    }

    /// Only a super-user's connection may kill another connection's
    /// in-flight query (§4.9).
    pub fn kill_query(&self, caller_conn_id: u64, target_conn_id: u64, query_id: u64) -> Result<()> {
        self.require_super_user(caller_conn_id)?;
        let target = self
            .connections
            .get(&target_conn_id)
            .ok_or_else(|| DbError::NotFound(format!("connection {target_conn_id}")))?;
        if target.current_query_id() != query_id {
            return Err(DbError::InvalidInput(format!(
                "query {query_id} is not the active query on connection {target_conn_id}"
            )));
        }
        // The actual cancellation fan-out is the scheduler's job
        // (`scheduler::drop::cancel_job`); this registry only authorizes
        // and records the request.
        Ok(())
    }

    pub fn kill_conn(&self, caller_conn_id: u64, target_conn_id: u64) -> Result<()> {
        self.require_super_user(caller_conn_id)?;
        let target = self
            .connections
            .get(&target_conn_id)
            .ok_or_else(|| DbError::NotFound(format!("connection {target_conn_id}")))?;
        target.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn require_super_user(&self, caller_conn_id: u64) -> Result<()> {
        let caller = self
            .connections
            .get(&caller_conn_id)
            .ok_or_else(|| DbError::NotFound(format!("connection {caller_conn_id}")))?;
        if !caller.is_super_user {
            return Err(DbError::PermissionDenied(format!(
                "connection {caller_conn_id} is not a super-user"
            )));
        }
        Ok(())
    }

    /// Introspection: connection ids currently live, oldest-access first.
    pub fn list_connections(&self) -> Vec<u64> {
        let mut ids: Vec<(u64, u64)> =
            self.connections.iter().map(|e| (*e.key(), e.value().last_access_ms())).collect();
        ids.sort_by_key(|(_, last_access)| *last_access);
        ids.into_iter().map(|(id, _)| id).collect()
    }

    pub fn get(&self, conn_id: u64) -> Option<ConnectionSnapshot> {
        self.connections.get(&conn_id).map(|e| ConnectionSnapshot {
            conn_id: e.conn_id,
            user: e.user.clone(),
            app: e.app.clone(),
            pid: e.pid,
            client_ip: e.client_ip,
            client_port: e.client_port,
            is_super_user: e.is_super_user,
            killed: e.is_killed(),
            login_ts_ms: e.login_ts_ms,
            last_access_ms: e.last_access_ms(),
            current_query_id: e.current_query_id(),
            recent_queries: e.recent_queries(),
        })
    }

    /// TTL sweep: drop connections whose `last_access_ms` is older than
    /// `ttl` relative to `now_ts_ms` and that have no outstanding
    /// references.
    pub fn sweep_expired(&self, now_ts_ms: u64) -> usize {
        let ttl_ms = self.ttl.as_millis() as u64;
        let expired: Vec<u64> = self
            .connections
            .iter()
            .filter(|e| {
                now_ts_ms.saturating_sub(e.value().last_access_ms()) > ttl_ms
                    && e.value().ref_count.load(Ordering::SeqCst) == 0
            })
            .map(|e| *e.key())
            .collect();
        let count = expired.len();
        for id in expired {
            self.connections.remove(&id);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(super_user: bool) -> RpcConnInfo {
        RpcConnInfo {
            user: "root".into(),
            app: "taos".into(),
            pid: 100,
            client_ip: "127.0.0.1".parse().unwrap(),
            client_port: 9000,
            is_super_user: super_user,
        }
    }

    #[test]
    fn create_and_acquire_touches_last_access() {
        let reg = ConnectionRegistry::new(Duration::from_secs(60));
        let id = reg.create_conn(info(false), 1000);
        reg.acquire(id).unwrap();
        assert!(reg.get(id).is_some());
    }

    #[test]
    fn heartbeat_rejects_changed_endpoint() {
        let reg = ConnectionRegistry::new(Duration::from_secs(60));
        let id = reg.create_conn(info(false), 1000);
        let mut changed = info(false);
        changed.client_port = 9999;
        assert!(reg.heartbeat(Some(id), changed, 2000).is_err());
    }

    #[test]
    fn heartbeat_creates_new_when_conn_unknown() {
        let reg = ConnectionRegistry::new(Duration::from_secs(60));
        let id = reg.heartbeat(None, info(false), 1000).unwrap();
        assert!(reg.get(id).is_some());
    }

    #[test]
    fn kill_conn_requires_super_user() {
        let reg = ConnectionRegistry::new(Duration::from_secs(60));
        let normal = reg.create_conn(info(false), 1000);
        let target = reg.create_conn(info(false), 1000);
        assert!(reg.kill_conn(normal, target).is_err());

        let admin = reg.create_conn(info(true), 1000);
        reg.kill_conn(admin, target).unwrap();
        assert!(reg.get(target).unwrap().is_killed());
    }

    #[test]
    fn sweep_expired_removes_stale_unreferenced_connections() {
        let reg = ConnectionRegistry::new(Duration::from_millis(500));
        let id = reg.create_conn(info(false), 1000);
        assert_eq!(reg.sweep_expired(1200), 0, "not yet stale");
        assert_eq!(reg.sweep_expired(2000), 1, "past ttl with no references");
        assert!(reg.get(id).is_none());
    }

    #[test]
    fn recent_queries_ring_is_bounded() {
        let reg = ConnectionRegistry::new(Duration::from_secs(60));
        let id = reg.create_conn(info(false), 1000);
        for i in 0..(MAX_RECENT_QUERIES as u64 + 5) {
            reg.set_current_query(id, i, format!("select {i}"), 1000 + i);
        }
        assert_eq!(reg.get(id).unwrap().recent_queries().len(), MAX_RECENT_QUERIES);
    }
}
