// RustyDB - Distributed time-series query execution engine
// Core library module

pub mod catalog;
pub mod config;
pub mod connection_registry;
pub mod error;
pub mod execution;
pub mod heartbeat;
pub mod metastore;
pub mod network;
pub mod query_worker;
pub mod scheduler;
pub mod sink;
pub mod transaction;

pub use error::{Result, DbError};

use std::sync::Arc;
use std::time::Duration;

use catalog::Catalog;
use config::{ExecutorConfig, HeartbeatConfig, SchedulerConfig};
use connection_registry::ConnectionRegistry;
use heartbeat::HeartbeatManagerRegistry;
use metastore::SdbTableSet;
use scheduler::SchedulerManager;

/// The single piece of global mutable state this crate owns (SPEC_FULL.md
/// §9: "becomes a single `Context` handed to subsystems at
/// initialization"), bundling every per-process registry plus the
/// component configs that size them. `main.rs` builds exactly one of
/// these at startup and tears it down in reverse on shutdown.
pub struct ClusterContext {
    pub scheduler: SchedulerManager,
    pub catalog: Arc<Catalog>,
    pub sdb: Arc<SdbTableSet>,
    pub connections: ConnectionRegistry,
    pub heartbeats: Arc<HeartbeatManagerRegistry>,
    pub executor_config: ExecutorConfig,
    pub heartbeat_config: HeartbeatConfig,
}

impl ClusterContext {
    pub fn new(scheduler_config: SchedulerConfig, executor_config: ExecutorConfig, heartbeat_config: HeartbeatConfig) -> Self {
        Self {
            scheduler: SchedulerManager::with_config(scheduler_config),
            catalog: Arc::new(Catalog::new()),
            sdb: Arc::new(SdbTableSet::new()),
            connections: ConnectionRegistry::new(heartbeat_config.max_idle_duration()),
            heartbeats: Arc::new(HeartbeatManagerRegistry::new()),
            executor_config,
            heartbeat_config,
        }
    }
}

impl Default for ClusterContext {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), ExecutorConfig::default(), HeartbeatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_wires_every_subsystem() {
        let ctx = ClusterContext::default();
        assert_eq!(ctx.scheduler.job_count(), 0);
        assert_eq!(ctx.heartbeat_config.interval(), Duration::from_millis(1500));
    }
}
