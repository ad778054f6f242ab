//! Columnar data block passed between physical operators, grounded on the
//! teacher's `vectorized::ColumnBatch` but narrowed to what the operator
//! tree (§4.4) actually needs: a `Vec<ColumnData>` with a shared row count,
//! column 0 always holding timestamps for the windowing operators.

use serde::{Deserialize, Serialize};

use crate::execution::vectorized::ColumnValue;

/// One column's worth of values within a `DataBlock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ColumnData {
    pub values: Vec<ColumnValue>,
}

impl ColumnData {
    pub fn with_capacity(cap: usize) -> Self {
        Self { values: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A block of rows flowing through the operator tree, one `ColumnData` per
/// output column. Column 0 is the timestamp column whenever an operator's
/// contract (interval/session/state window) requires one, per
/// SPEC_FULL.md §4.4 ("timestamps always present in column 0").
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct DataBlock {
    pub columns: Vec<ColumnData>,
    pub row_count: usize,
}

impl DataBlock {
    pub fn new(num_columns: usize) -> Self {
        Self { columns: vec![ColumnData::default(); num_columns], row_count: 0 }
    }

    pub fn with_capacity(num_columns: usize, cap: usize) -> Self {
        Self {
            columns: (0..num_columns).map(|_| ColumnData::with_capacity(cap)).collect(),
            row_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn push_row(&mut self, values: Vec<ColumnValue>) {
        debug_assert_eq!(values.len(), self.columns.len());
        for (col, v) in self.columns.iter_mut().zip(values.into_iter()) {
            col.values.push(v);
        }
        self.row_count += 1;
    }

    /// The timestamp of row `idx` in column 0, used by the windowing
    /// operators. Panics on a non-integer column 0 value — callers are
    /// expected to validate their scan's schema up front.
    pub fn timestamp_at(&self, idx: usize) -> i64 {
        match &self.columns[0].values[idx] {
            ColumnValue::BigInt(t) => *t,
            ColumnValue::Integer(t) => *t as i64,
            other => panic!("column 0 is not a timestamp column: {other:?}"),
        }
    }

    /// Extract a single row as an owned value vector (used when a blocking
    /// operator re-homes rows into a hash table or sorted buffer).
    pub fn row(&self, idx: usize) -> Vec<ColumnValue> {
        self.columns.iter().map(|c| c.values[idx].clone()).collect()
    }

    /// Slice rows `[start, end)` into a new block, used by windowing
    /// operators to materialize one closed window's worth of input rows.
    pub fn slice(&self, start: usize, end: usize) -> DataBlock {
        let mut out = DataBlock::new(self.columns.len());
        for i in start..end {
            out.push_row(self.row(i));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_tracks_count() {
        let mut block = DataBlock::new(2);
        block.push_row(vec![ColumnValue::BigInt(1), ColumnValue::Integer(10)]);
        block.push_row(vec![ColumnValue::BigInt(2), ColumnValue::Integer(20)]);
        assert_eq!(block.row_count, 2);
        assert_eq!(block.timestamp_at(1), 2);
    }

    #[test]
    fn slice_extracts_subrange() {
        let mut block = DataBlock::new(1);
        for t in 0..5 {
            block.push_row(vec![ColumnValue::BigInt(t)]);
        }
        let sliced = block.slice(1, 3);
        assert_eq!(sliced.row_count, 2);
        assert_eq!(sliced.timestamp_at(0), 1);
        assert_eq!(sliced.timestamp_at(1), 2);
    }
}
