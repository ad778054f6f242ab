//! Blocking sort/merge operator (SPEC_FULL.md §4.4: "Multiway-merge / sort
//! / order: blocking; fully drains downstream then emits sorted"),
//! grounded on the three-phase state machine in `operator.rs` and the
//! teacher's `sort_merge::SortConfig`/top-k ideas, narrowed to the
//! in-memory case the operator tree actually needs (spill-to-disk external
//! merge sort is the on-disk TSDB concern named out of scope in
//! SPEC_FULL.md §1).

use std::cmp::Ordering;

use crate::execution::block::DataBlock;
use crate::execution::operator::{check_killed, Operator, OperatorStatus, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

fn cmp_values(a: &ColumnValue, b: &ColumnValue) -> Ordering {
    match (a, b) {
        (ColumnValue::Null, ColumnValue::Null) => Ordering::Equal,
        (ColumnValue::Null, _) => Ordering::Less,
        (_, ColumnValue::Null) => Ordering::Greater,
        (ColumnValue::Integer(x), ColumnValue::Integer(y)) => x.cmp(y),
        (ColumnValue::BigInt(x), ColumnValue::BigInt(y)) => x.cmp(y),
        (ColumnValue::Float(x), ColumnValue::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (ColumnValue::Double(x), ColumnValue::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (ColumnValue::String(x), ColumnValue::String(y)) => x.cmp(y),
        (ColumnValue::Boolean(x), ColumnValue::Boolean(y)) => x.cmp(y),
        // Mixed-type comparisons can't occur on a single well-typed column;
        // fall back to a stable, arbitrary order rather than panicking.
        _ => Ordering::Equal,
    }
}

/// One ORDER BY key: column index plus ascending/descending.
#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

/// Sorts all rows from its child by one or more keys, with an optional
/// row cap (the "limit" case folds into a top-k selection so the operator
/// never materializes more than `limit` rows of output).
pub struct SortOperator {
    child: Box<dyn Operator>,
    keys: Vec<SortKey>,
    limit: Option<usize>,
    status: OperatorStatus,
    rows: Vec<Vec<ColumnValue>>,
    output_cursor: usize,
    num_columns: usize,
}

impl SortOperator {
    pub fn new(child: Box<dyn Operator>, keys: Vec<SortKey>, limit: Option<usize>) -> Self {
        let num_columns = child.output_columns();
        Self {
            child,
            keys,
            limit,
            status: OperatorStatus::Executing,
            rows: Vec::new(),
            output_cursor: 0,
            num_columns,
        }
    }

    fn row_cmp(&self, a: &[ColumnValue], b: &[ColumnValue]) -> Ordering {
        for key in &self.keys {
            let ord = cmp_values(&a[key.column], &b[key.column]);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            check_killed(self.child.is_killed())?;
            match self.child.pull()? {
                PullOutcome::Ready { block, .. } => {
                    for i in 0..block.row_count {
                        self.rows.push(block.row(i));
                    }
                }
                PullOutcome::Pending(_) => continue,
                PullOutcome::Done => break,
            }
        }
        self.rows.sort_by(|a, b| self.row_cmp(a, b));
        if let Some(limit) = self.limit {
            self.rows.truncate(limit);
        }
        self.status = OperatorStatus::ResToReturn;
        Ok(())
    }
}

impl Operator for SortOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        if self.status == OperatorStatus::Executing {
            self.drain()?;
        }
        if self.output_cursor >= self.rows.len() {
            self.status = OperatorStatus::Done;
            return Ok(PullOutcome::Done);
        }
        let mut block = DataBlock::new(self.num_columns);
        // Emit in one block; callers that need bounded memory per block can
        // slice it further upstream (the operator's contract is "fully
        // sorted output", not a fixed block size).
        while self.output_cursor < self.rows.len() {
            block.push_row(self.rows[self.output_cursor].clone());
            self.output_cursor += 1;
        }
        Ok(PullOutcome::Ready { block, new_group: false })
    }

    fn output_columns(&self) -> usize {
        self.num_columns
    }

    fn is_killed(&self) -> bool {
        self.child.is_killed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecOperator {
        blocks: Vec<DataBlock>,
        idx: usize,
        cols: usize,
    }
    impl Operator for VecOperator {
        fn pull(&mut self) -> Result<PullOutcome> {
            if self.idx < self.blocks.len() {
                let block = self.blocks[self.idx].clone();
                self.idx += 1;
                Ok(PullOutcome::Ready { block, new_group: false })
            } else {
                Ok(PullOutcome::Done)
            }
        }
        fn output_columns(&self) -> usize {
            self.cols
        }
    }

    fn block_of(values: &[i64]) -> DataBlock {
        let mut b = DataBlock::new(1);
        for v in values {
            b.push_row(vec![ColumnValue::BigInt(*v)]);
        }
        b
    }

    #[test]
    fn sorts_ascending_across_blocks() {
        let child = VecOperator {
            blocks: vec![block_of(&[5, 1, 3]), block_of(&[4, 2])],
            idx: 0,
            cols: 1,
        };
        let mut sort = SortOperator::new(
            Box::new(child),
            vec![SortKey { column: 0, descending: false }],
            None,
        );
        let PullOutcome::Ready { block, .. } = sort.pull().unwrap() else { panic!("expected rows") };
        let got: Vec<i64> = (0..block.row_count)
            .map(|i| match &block.columns[0].values[i] {
                ColumnValue::BigInt(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
        assert!(matches!(sort.pull().unwrap(), PullOutcome::Done));
    }

    #[test]
    fn limit_caps_output_after_sort() {
        let child = VecOperator { blocks: vec![block_of(&[5, 1, 3, 4, 2])], idx: 0, cols: 1 };
        let mut sort = SortOperator::new(
            Box::new(child),
            vec![SortKey { column: 0, descending: true }],
            Some(2),
        );
        let PullOutcome::Ready { block, .. } = sort.pull().unwrap() else { panic!("expected rows") };
        assert_eq!(block.row_count, 2);
        assert_eq!(block.columns[0].values[0], ColumnValue::BigInt(5));
        assert_eq!(block.columns[0].values[1], ColumnValue::BigInt(4));
    }
}
