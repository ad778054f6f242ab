//! Storage handle contract (§6.3, external collaborator): the executor
//! talks to the on-disk TSDB engine only through this trait. This crate
//! ships a deterministic in-memory implementation for tests; the real file
//! engine is out of scope (spec.md §1 "Out of scope").

use crate::execution::block::DataBlock;
use crate::execution::vectorized::ColumnValue;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Asc,
    Desc,
}

/// A scan condition: column list, order, and time window, mirroring the
/// original's `cond` parameter to `query_tables`/`reset`.
#[derive(Debug, Clone)]
pub struct ScanCond {
    pub columns: Vec<String>,
    pub order: ScanOrder,
    pub window_start: i64,
    pub window_end: i64,
}

impl ScanCond {
    pub fn swapped(&self) -> ScanCond {
        ScanCond {
            columns: self.columns.clone(),
            order: match self.order {
                ScanOrder::Asc => ScanOrder::Desc,
                ScanOrder::Desc => ScanOrder::Asc,
            },
            window_start: self.window_start,
            window_end: self.window_end,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockInfo {
    pub rows: usize,
    /// Min/max timestamp in the block, used by statistics-based block
    /// skipping ("may skip blocks whose statistics disqualify them").
    pub min_ts: i64,
    pub max_ts: i64,
}

/// The executor's only dependency on the storage engine. `query_tables`
/// opens a scan handle; `next_block`/`retrieve_block` drive it
/// block-at-a-time; `reset` rewinds with a new condition (used by the
/// table-scan operator's forward-then-reverse repeat).
pub trait StorageHandle: Send {
    fn query_tables(&mut self, cond: &ScanCond) -> Result<()>;
    fn reset(&mut self, cond: &ScanCond) -> Result<()>;
    fn next_block(&mut self) -> Result<bool>;
    fn block_info(&self) -> BlockInfo;
    fn retrieve_block(&mut self) -> Result<DataBlock>;
    fn table_name(&self) -> &str;
}

/// Deterministic in-memory storage handle: rows are `(ts, values)` pairs
/// supplied up front, split into blocks of `block_size` per `next_block`
/// call in whatever order the scan condition asks for.
pub struct InMemoryStorageHandle {
    name: String,
    rows: Vec<(i64, Vec<ColumnValue>)>,
    block_size: usize,
    cursor: usize,
    order: ScanOrder,
    current: Option<Vec<(i64, Vec<ColumnValue>)>>,
}

impl InMemoryStorageHandle {
    pub fn new(name: impl Into<String>, rows: Vec<(i64, Vec<ColumnValue>)>, block_size: usize) -> Self {
        Self {
            name: name.into(),
            rows,
            block_size: block_size.max(1),
            cursor: 0,
            order: ScanOrder::Asc,
            current: None,
        }
    }
}

impl StorageHandle for InMemoryStorageHandle {
    fn query_tables(&mut self, cond: &ScanCond) -> Result<()> {
        self.reset(cond)
    }

    fn reset(&mut self, cond: &ScanCond) -> Result<()> {
        self.order = cond.order;
        let mut ordered = self.rows.clone();
        ordered.retain(|(ts, _)| *ts >= cond.window_start && *ts <= cond.window_end);
        ordered.sort_by_key(|(ts, _)| *ts);
        if cond.order == ScanOrder::Desc {
            ordered.reverse();
        }
        self.rows = ordered;
        self.cursor = 0;
        self.current = None;
        Ok(())
    }

    fn next_block(&mut self) -> Result<bool> {
        if self.cursor >= self.rows.len() {
            self.current = None;
            return Ok(false);
        }
        let end = (self.cursor + self.block_size).min(self.rows.len());
        self.current = Some(self.rows[self.cursor..end].to_vec());
        self.cursor = end;
        Ok(true)
    }

    fn block_info(&self) -> BlockInfo {
        match &self.current {
            Some(rows) if !rows.is_empty() => BlockInfo {
                rows: rows.len(),
                min_ts: rows.first().unwrap().0,
                max_ts: rows.last().unwrap().0,
            },
            _ => BlockInfo::default(),
        }
    }

    fn retrieve_block(&mut self) -> Result<DataBlock> {
        let rows = self.current.take().unwrap_or_default();
        let num_cols = rows.first().map(|(_, v)| v.len() + 1).unwrap_or(1);
        let mut block = DataBlock::with_capacity(num_cols, rows.len());
        for (ts, vals) in rows {
            let mut row = Vec::with_capacity(num_cols);
            row.push(ColumnValue::BigInt(ts));
            row.extend(vals);
            block.push_row(row);
        }
        Ok(block)
    }

    fn table_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryStorageHandle {
        InMemoryStorageHandle::new(
            "t",
            (0..10).map(|i| (i, vec![ColumnValue::Integer(i as i32)])).collect(),
            3,
        )
    }

    #[test]
    fn blocks_cover_all_rows_in_order() {
        let mut h = sample();
        let cond = ScanCond { columns: vec![], order: ScanOrder::Asc, window_start: 0, window_end: 100 };
        h.query_tables(&cond).unwrap();
        let mut total = 0;
        while h.next_block().unwrap() {
            let info = h.block_info();
            total += info.rows;
            let block = h.retrieve_block().unwrap();
            assert_eq!(block.row_count, info.rows);
        }
        assert_eq!(total, 10);
    }

    #[test]
    fn reverse_scan_after_swap() {
        let mut h = sample();
        let cond = ScanCond { columns: vec![], order: ScanOrder::Asc, window_start: 0, window_end: 100 };
        h.query_tables(&cond).unwrap();
        h.reset(&cond.swapped()).unwrap();
        h.next_block().unwrap();
        let block = h.retrieve_block().unwrap();
        assert_eq!(block.timestamp_at(0), 9);
    }
}
