//! Project / filter / limit / slimit operators, grounded on SPEC_FULL.md
//! §4.4 ("standard streaming behaviors. Limit decrements a global offset
//! before counting."). All three are pass-through over the pull-based
//! operator tree: no draining, no buffering, one input row maps to at most
//! one output row.

use crate::execution::block::DataBlock;
use crate::execution::operator::{check_killed, Operator, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

/// Projects a fixed list of input columns (by index) into the output
/// block, in the given order. Column 0 is re-selected explicitly by
/// callers that need the timestamp preserved downstream.
pub struct ProjectOperator {
    child: Box<dyn Operator>,
    columns: Vec<usize>,
}

impl ProjectOperator {
    pub fn new(child: Box<dyn Operator>, columns: Vec<usize>) -> Self {
        Self { child, columns }
    }
}

impl Operator for ProjectOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        check_killed(self.is_killed())?;
        match self.child.pull()? {
            PullOutcome::Ready { block, new_group } => {
                let mut out = DataBlock::with_capacity(self.columns.len(), block.row_count);
                for row in 0..block.row_count {
                    let values = self.columns.iter().map(|&c| block.columns[c].values[row].clone()).collect();
                    out.push_row(values);
                }
                Ok(PullOutcome::Ready { block: out, new_group })
            }
            other => Ok(other),
        }
    }

    fn output_columns(&self) -> usize {
        self.columns.len()
    }

    fn is_killed(&self) -> bool {
        self.child.is_killed()
    }
}

/// A single comparison predicate evaluated against one row's columns.
pub enum FilterPred {
    Eq(usize, ColumnValue),
    Ne(usize, ColumnValue),
    Lt(usize, ColumnValue),
    Le(usize, ColumnValue),
    Gt(usize, ColumnValue),
    Ge(usize, ColumnValue),
}

fn as_f64(v: &ColumnValue) -> Option<f64> {
    match v {
        ColumnValue::Integer(i) => Some(*i as f64),
        ColumnValue::BigInt(i) => Some(*i as f64),
        ColumnValue::Float(f) => Some(*f as f64),
        ColumnValue::Double(f) => Some(*f),
        _ => None,
    }
}

fn compare(a: &ColumnValue, b: &ColumnValue) -> Option<std::cmp::Ordering> {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => None,
    }
}

impl FilterPred {
    fn eval(&self, block: &DataBlock, row: usize) -> bool {
        match self {
            FilterPred::Eq(col, v) => &block.columns[*col].values[row] == v,
            FilterPred::Ne(col, v) => &block.columns[*col].values[row] != v,
            FilterPred::Lt(col, v) => {
                compare(&block.columns[*col].values[row], v) == Some(std::cmp::Ordering::Less)
            }
            FilterPred::Le(col, v) => {
                matches!(compare(&block.columns[*col].values[row], v), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
            }
            FilterPred::Gt(col, v) => {
                compare(&block.columns[*col].values[row], v) == Some(std::cmp::Ordering::Greater)
            }
            FilterPred::Ge(col, v) => matches!(
                compare(&block.columns[*col].values[row], v),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
        }
    }
}

/// Drops rows failing any predicate in `preds` (conjunction). Pulls
/// repeatedly from the child until a non-empty filtered block is produced
/// or the child is exhausted, so callers never see spurious empty blocks.
pub struct FilterOperator {
    child: Box<dyn Operator>,
    preds: Vec<FilterPred>,
}

impl FilterOperator {
    pub fn new(child: Box<dyn Operator>, preds: Vec<FilterPred>) -> Self {
        Self { child, preds }
    }
}

impl Operator for FilterOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        loop {
            check_killed(self.is_killed())?;
            match self.child.pull()? {
                PullOutcome::Ready { block, new_group } => {
                    let mut out = DataBlock::with_capacity(block.columns.len(), block.row_count);
                    for row in 0..block.row_count {
                        if self.preds.iter().all(|p| p.eval(&block, row)) {
                            out.push_row(block.row(row));
                        }
                    }
                    if out.is_empty() {
                        continue;
                    }
                    return Ok(PullOutcome::Ready { block: out, new_group });
                }
                other => return Ok(other),
            }
        }
    }

    fn output_columns(&self) -> usize {
        self.child.output_columns()
    }

    fn is_killed(&self) -> bool {
        self.child.is_killed()
    }
}

/// Caps the total number of rows returned to `limit`, after first skipping
/// `offset` rows — "limit decrements a global offset before counting" per
/// SPEC_FULL.md §4.4: the running offset is consumed before any row counts
/// against the limit.
pub struct LimitOperator {
    child: Box<dyn Operator>,
    offset: u64,
    limit: u64,
    emitted: u64,
}

impl LimitOperator {
    pub fn new(child: Box<dyn Operator>, offset: u64, limit: u64) -> Self {
        Self { child, offset, limit, emitted: 0 }
    }
}

impl Operator for LimitOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        if self.emitted >= self.limit {
            return Ok(PullOutcome::Done);
        }
        loop {
            check_killed(self.is_killed())?;
            match self.child.pull()? {
                PullOutcome::Ready { block, new_group } => {
                    let mut out = DataBlock::with_capacity(block.columns.len(), block.row_count);
                    for row in 0..block.row_count {
                        if self.offset > 0 {
                            self.offset -= 1;
                            continue;
                        }
                        if self.emitted >= self.limit {
                            break;
                        }
                        out.push_row(block.row(row));
                        self.emitted += 1;
                    }
                    if out.is_empty() {
                        if self.emitted >= self.limit {
                            return Ok(PullOutcome::Done);
                        }
                        continue;
                    }
                    return Ok(PullOutcome::Ready { block: out, new_group });
                }
                other => return Ok(other),
            }
        }
    }

    fn output_columns(&self) -> usize {
        self.child.output_columns()
    }

    fn is_killed(&self) -> bool {
        self.child.is_killed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Feed {
        blocks: Vec<DataBlock>,
        idx: usize,
    }
    impl Operator for Feed {
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
            2
        }
    }

    fn feed_rows(n: i64) -> Feed {
        let mut block = DataBlock::new(2);
        for i in 0..n {
            block.push_row(vec![ColumnValue::BigInt(i), ColumnValue::Integer(i as i32)]);
        }
        Feed { blocks: vec![block], idx: 0 }
    }

    #[test]
    fn project_reorders_and_narrows_columns() {
        let mut op = ProjectOperator::new(Box::new(feed_rows(3)), vec![1, 0]);
        let PullOutcome::Ready { block, .. } = op.pull().unwrap() else { panic!("expected block") };
        assert_eq!(block.columns.len(), 2);
        assert_eq!(block.columns[0].values[0], ColumnValue::Integer(0));
        assert_eq!(block.columns[1].values[0], ColumnValue::BigInt(0));
    }

    #[test]
    fn filter_drops_rows_failing_predicate() {
        let mut op = FilterOperator::new(
            Box::new(feed_rows(5)),
            vec![FilterPred::Ge(1, ColumnValue::Integer(3))],
        );
        let PullOutcome::Ready { block, .. } = op.pull().unwrap() else { panic!("expected block") };
        assert_eq!(block.row_count, 2);
        assert_eq!(block.columns[1].values[0], ColumnValue::Integer(3));
        assert_eq!(block.columns[1].values[1], ColumnValue::Integer(4));
    }

    #[test]
    fn limit_consumes_offset_before_counting() {
        let mut op = LimitOperator::new(Box::new(feed_rows(10)), 3, 4);
        let PullOutcome::Ready { block, .. } = op.pull().unwrap() else { panic!("expected block") };
        assert_eq!(block.row_count, 4);
        assert_eq!(block.columns[1].values[0], ColumnValue::Integer(3));
        assert_eq!(block.columns[1].values[3], ColumnValue::Integer(6));
        assert!(matches!(op.pull().unwrap(), PullOutcome::Done));
    }
}
