//! Exchange operator: round-robins a list of remote sources, pulling each
//! via a FETCH RPC, grounded on `scheduler.c`'s fetch pattern
//! (`schFetchFromRemote`) and `createExchangeOperatorInfo`'s per-source
//! bookkeeping. The shared-`RpcShim` design decided in DESIGN.md's Open
//! Question answers "one client per exchange, pooled at the task level".

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::execution::block::DataBlock;
use crate::execution::operator::{Operator, PullOutcome};
use crate::network::rpc::{RpcKey, RpcOutcome, RpcShim, TaskMsgType};
use crate::network::task_codec::{FetchRspMsg, TaskMsgHeader};
use crate::Result;
use crate::error::DbError;

/// One upstream source this exchange reads from: a (vgId, schedId,
/// queryId, taskId) addressing tuple used to build the FETCH request.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeSource {
    pub header: TaskMsgHeader,
}

/// Per-source accumulated profiling counters, per SPEC_FULL.md §4.4:
/// "total rows/bytes/elapsed are accumulated per exchange node."
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeStats {
    pub rows: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Sends a FETCH request for one source and awaits its response. Split out
/// as a trait so the operator can be unit-tested with a stub dispatcher
/// instead of a live network round-trip.
#[async_trait::async_trait]
pub trait FetchDispatcher: Send + Sync {
    async fn fetch(&self, source: &ExchangeSource) -> Result<FetchRspMsg>;
}

/// Dispatches a FETCH over the shared `RpcShim`, matching the shape of
/// every other task-protocol round trip in this crate.
pub struct RpcFetchDispatcher {
    pub shim: Arc<RpcShim>,
    pub timeout: Duration,
}

#[async_trait::async_trait]
impl FetchDispatcher for RpcFetchDispatcher {
    async fn fetch(&self, source: &ExchangeSource) -> Result<FetchRspMsg> {
        let key = RpcKey {
            query_id: source.header.query_id,
            task_id: source.header.task_id,
            msg_type: TaskMsgType::Fetch,
        };
        let rx = self.shim.register(key);
        // The actual wire send happens at the query-worker/network layer;
        // this call only awaits the matching callback delivery.
        match self.shim.wait_timeout(key, rx, self.timeout).await? {
            RpcOutcome::Response { code, payload } => {
                if code != 0 {
                    return Err(DbError::Network(format!("fetch rejected with code {code}")));
                }
                FetchRspMsg::decode(payload.into())
            }
            RpcOutcome::Timeout => Err(DbError::Timeout(format!(
                "fetch timed out for task {}",
                source.header.task_id
            ))),
            RpcOutcome::Cancelled => Err(DbError::JobCancelled("exchange source cancelled".into())),
        }
    }
}

pub struct ExchangeOperator {
    sources: Vec<ExchangeSource>,
    current: usize,
    dispatcher: Arc<dyn FetchDispatcher>,
    output_columns: usize,
    stats: Vec<ExchangeStats>,
}

impl ExchangeOperator {
    pub fn new(sources: Vec<ExchangeSource>, dispatcher: Arc<dyn FetchDispatcher>, output_columns: usize) -> Self {
        let n = sources.len();
        Self { sources, current: 0, dispatcher, output_columns, stats: vec![ExchangeStats::default(); n] }
    }

    pub fn stats(&self) -> &[ExchangeStats] {
        &self.stats
    }

    /// Drives one fetch round against the current source, advancing past
    /// exhausted sources, returning `None` once every source is drained.
    pub async fn pull_async(&mut self) -> Result<Option<DataBlock>> {
        while self.current < self.sources.len() {
            let source = self.sources[self.current];
            let started = Instant::now();
            let rsp = self.dispatcher.fetch(&source).await?;
            let elapsed = started.elapsed();

            let stat = &mut self.stats[self.current];
            stat.rows += rsp.num_rows as u64;
            stat.bytes += rsp.data.len() as u64;
            stat.elapsed += elapsed;

            let block = if rsp.num_rows > 0 {
                Some(decode_wire_block(&rsp.data, rsp.num_rows, self.output_columns)?)
            } else {
                None
            };
            if rsp.completed {
                self.current += 1;
            }
            if let Some(block) = block {
                return Ok(Some(block));
            }
            // num_rows == 0 and completed: fall through to the next source.
        }
        Ok(None)
    }
}

/// Decode a fetch response payload into a `DataBlock`, matching the
/// `bincode::encode_to_vec(block, bincode::config::standard())` wire
/// format `network::server::dispatch_message` uses to serialize the
/// block a `FETCH` response carries (`rsp.data`).
fn decode_wire_block(data: &[u8], expected_rows: u32, output_columns: usize) -> Result<DataBlock> {
    let (block, _consumed): (DataBlock, usize) =
        bincode::decode_from_slice(data, bincode::config::standard())
            .map_err(|e| DbError::Serialization(format!("failed to decode exchange block: {e}")))?;
    if block.row_count != expected_rows as usize {
        return Err(DbError::Serialization(format!(
            "exchange block row_count mismatch: wire says {}, decoded {}",
            expected_rows, block.row_count
        )));
    }
    if block.columns.len() != output_columns {
        return Err(DbError::Serialization(format!(
            "exchange block column count mismatch: expected {}, decoded {}",
            output_columns,
            block.columns.len()
        )));
    }
    Ok(block)
}

impl Operator for ExchangeOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        // Exchange suspends on network I/O; the executor task driving this
        // tree awaits `pull_async` directly rather than calling through the
        // synchronous `Operator::pull`, matching §5's "suspension happens
        // only at exchange and data-sink boundaries". This sync entry point
        // exists to satisfy the trait for trees that mix exchange with
        // purely synchronous operators under a block_in_place executor.
        Err(DbError::NotImplemented(
            "ExchangeOperator must be driven via pull_async from an async executor task".into(),
        ))
    }

    fn output_columns(&self) -> usize {
        self.output_columns
    }
}
