//! Data sink (C6), grounded on SPEC_FULL.md §4.5: a bounded queue of data
//! blocks sitting between a task's operator tree and whoever is pulling
//! results out of it (an exchange operator on a parent task, or the
//! client-facing fetch path at level 0). Grounded on the original
//! `qwDataSink`/`dsDataSink` contract: `put`/`endPut` on the producer side,
//! `getDataLength`/`getDataBlock` on the consumer side, with a sticky
//! `queryEnd` flag and a tri-state buffer-fullness signal the producer uses
//! to throttle its own pull loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::DbError;
use crate::execution::block::DataBlock;
use crate::Result;

/// Default cap on buffered blocks per query, the `maxDataBlockNumPerQuery`
/// policy value from SPEC_FULL.md §4.5.
pub const DEFAULT_MAX_BLOCKS_PER_QUERY: usize = 1024;

/// Coarse fullness signal returned alongside a fetched block, letting the
/// consumer decide whether to keep pulling eagerly or back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufStatus {
    Empty,
    Low,
    Full,
}

/// One block handed back by `get_block`, carrying the sticky `query_end`
/// flag and the buffer's fullness at the moment of the read.
#[derive(Debug)]
pub struct SinkOutput {
    pub block: Option<DataBlock>,
    pub buf_status: BufStatus,
    pub query_end: bool,
}

struct Inner {
    blocks: VecDeque<DataBlock>,
    ended: bool,
    elapsed_on_end: Option<u64>,
}

/// Bounded producer/consumer queue of `DataBlock`s for one task.
///
/// `get_length` asserts single-caller discipline (only one concurrent
/// peek is permitted, per SPEC_FULL.md §4.5) via `length_in_flight`; it is
/// not meant to guard `get_block`, which tolerates being called from the
/// same single consumer repeatedly.
pub struct DataSink {
    inner: Mutex<Inner>,
    capacity: usize,
    length_in_flight: AtomicBool,
}

impl DataSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { blocks: VecDeque::new(), ended: false, elapsed_on_end: None }),
            capacity,
            length_in_flight: AtomicBool::new(false),
        }
    }

    /// Push one block. `continue_pull` is set false once the sink is at
    /// capacity, signalling the producer to stop pulling its operator tree
    /// until the consumer drains some blocks.
    pub fn put(&self, block: DataBlock) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.ended {
            return Err(DbError::InvalidInput("put after end_put".to_string()));
        }
        inner.blocks.push_back(block);
        Ok(inner.blocks.len() < self.capacity)
    }

    /// Mark end of stream. `elapsed_us` is retained for profiling only.
    pub fn end_put(&self, elapsed_us: u64) {
        let mut inner = self.inner.lock();
        inner.ended = true;
        inner.elapsed_on_end = Some(elapsed_us);
    }

    /// Peek the next block's row count as a stand-in for its wire length,
    /// and whether the stream has ended with nothing left buffered.
    /// Asserts no overlapping `get_length` call is in flight.
    pub fn get_length(&self) -> Result<(usize, bool)> {
        if self
            .length_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DbError::InvalidInput("concurrent get_length not permitted".to_string()));
        }
        let inner = self.inner.lock();
        let len = inner.blocks.front().map(|b| b.row_count).unwrap_or(0);
        let query_end = inner.ended && inner.blocks.is_empty();
        self.length_in_flight.store(false, Ordering::SeqCst);
        Ok((len, query_end))
    }

    /// Pop one block, reporting the post-pop fullness and the sticky
    /// `query_end` flag (true once `end_put` has fired and nothing is
    /// left buffered, and stays true thereafter).
    pub fn get_block(&self) -> SinkOutput {
        let mut inner = self.inner.lock();
        let block = inner.blocks.pop_front();
        let query_end = inner.ended && inner.blocks.is_empty();
        let buf_status = if inner.blocks.is_empty() {
            BufStatus::Empty
        } else if inner.blocks.len() * 4 >= self.capacity * 3 {
            BufStatus::Full
        } else {
            BufStatus::Low
        };
        SinkOutput { block, buf_status, query_end }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DataSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCKS_PER_QUERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_reports_continue_until_capacity() {
        let sink = DataSink::new(2);
        assert!(sink.put(DataBlock::new(1)).unwrap());
        assert!(!sink.put(DataBlock::new(1)).unwrap());
    }

    #[test]
    fn query_end_is_sticky_once_drained() {
        let sink = DataSink::new(4);
        sink.put(DataBlock::new(1)).unwrap();
        sink.end_put(100);
        let out = sink.get_block();
        assert!(out.block.is_some());
        assert!(!out.query_end, "one block still implies not yet drained at this read");
        let out2 = sink.get_block();
        assert!(out2.block.is_none());
        assert!(out2.query_end);
        let out3 = sink.get_block();
        assert!(out3.query_end);
    }

    #[test]
    fn put_after_end_put_rejected() {
        let sink = DataSink::new(4);
        sink.end_put(0);
        assert!(sink.put(DataBlock::new(1)).is_err());
    }

    #[test]
    fn concurrent_get_length_rejected() {
        let sink = DataSink::new(4);
        sink.length_in_flight.store(true, Ordering::SeqCst);
        assert!(sink.get_length().is_err());
    }
}
