//! RustyDB query-worker server entry point. Initializes a `ClusterContext`
//! and the per-vnode task-protocol listener (`network::Server`); the
//! heartbeat worker and scheduler/catalog state live on that same context
//! so CLI tools embedding this crate see one consistent set of registries
//! (§9 "Global mutable state [...] becomes a single `Context`").

use std::sync::Arc;

use tracing::{error, info};

use rusty_db::config::{ExecutorConfig, HeartbeatConfig, SchedulerConfig};
use rusty_db::heartbeat::worker::{run_loop, BatchTransport};
use rusty_db::network::Server;
use rusty_db::{ClusterContext, Result};

struct NoopTransport;

#[async_trait::async_trait]
impl BatchTransport for NoopTransport {
    async fn send_batch(&self, _cluster_key: &str, request: bytes::Bytes) -> Result<bytes::Bytes> {
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).with_thread_ids(true).with_level(true).init();

    let scheduler_config = SchedulerConfig::default().merge_env();
    let executor_config = ExecutorConfig::default().merge_env();
    let heartbeat_config = HeartbeatConfig::default().merge_env();

    info!(
        max_job_num = scheduler_config.max_job_num,
        max_data_block_num_per_query = executor_config.max_data_block_num_per_query,
        heartbeat_interval_ms = heartbeat_config.heartbeat_interval_ms,
        "starting rustydb query worker"
    );

    let ctx = Arc::new(ClusterContext::new(scheduler_config, executor_config, heartbeat_config));

    let (hb_shutdown_tx, hb_shutdown_rx) = tokio::sync::oneshot::channel();
    let heartbeat_task = tokio::spawn(run_loop(
        ctx.heartbeats.clone(),
        ctx.catalog.clone(),
        Arc::new(NoopTransport),
        ctx.heartbeat_config.interval(),
        hb_shutdown_rx,
    ));

    let port = std::env::var("RUSTYDB_PORT").ok().and_then(|v| v.parse::<u16>().ok()).unwrap_or(6030);
    let addr = format!("0.0.0.0:{port}");
    let server = Server::new();

    info!(%addr, "query-worker listening");
    let result = server.run(&addr).await;

    if let Err(ref e) = result {
        error!(error = %e, "server stopped with error");
    } else {
        info!("server stopped gracefully");
    }

    let _ = hb_shutdown_tx.send(());
    let _ = heartbeat_task.await;
    info!("shutdown complete");

    result
}
