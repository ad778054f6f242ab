//! Group-by operator: sorts by a designated group column (rejecting
//! float/double group columns) and streams rows into per-group result
//! rows, per SPEC_FULL.md §4.4.

use crate::error::DbError;
use crate::execution::agg::{AggAccumulator, AggExpr};
use crate::execution::block::DataBlock;
use crate::execution::operator::{check_killed, Operator, OperatorStatus, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

fn sort_key(v: &ColumnValue) -> Result<String> {
    match v {
        ColumnValue::Float(_) | ColumnValue::Double(_) => {
            Err(DbError::InvalidInput("GROUP BY column must not be float/double".into()))
        }
        other => Ok(format!("{other:?}")),
    }
}

pub struct GroupByOperator {
    child: Box<dyn Operator>,
    group_column: usize,
    exprs: Vec<AggExpr>,
    status: OperatorStatus,
    groups: Vec<(String, Vec<AggAccumulator>)>,
    cursor: usize,
}

impl GroupByOperator {
    pub fn new(child: Box<dyn Operator>, group_column: usize, exprs: Vec<AggExpr>) -> Self {
        Self { child, group_column, exprs, status: OperatorStatus::Executing, groups: Vec::new(), cursor: 0 }
    }

    fn find_or_insert(&mut self, key: &str) -> usize {
        if let Some(i) = self.groups.iter().position(|(k, _)| k == key) {
            return i;
        }
        self.groups.push((key.to_string(), self.exprs.iter().map(|e| AggAccumulator::new(e.func)).collect()));
        self.groups.len() - 1
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            check_killed(self.child.is_killed())?;
            match self.child.pull()? {
                PullOutcome::Ready { block, .. } => {
                    for row in 0..block.row_count {
                        let key = sort_key(&block.columns[self.group_column].values[row])?;
                        let idx = self.find_or_insert(&key);
                        for (acc, expr) in self.groups[idx].1.iter_mut().zip(self.exprs.iter()) {
                            acc.accumulate(&block.columns[expr.input_column].values[row]);
                        }
                    }
                }
                PullOutcome::Pending(_) => continue,
                PullOutcome::Done => break,
            }
        }
        self.groups.sort_by(|a, b| a.0.cmp(&b.0));
        self.status = OperatorStatus::ResToReturn;
        Ok(())
    }
}

impl Operator for GroupByOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        if self.status == OperatorStatus::Executing {
            self.drain()?;
        }
        if self.cursor >= self.groups.len() {
            self.status = OperatorStatus::Done;
            return Ok(PullOutcome::Done);
        }
        let (_, accs) = &self.groups[self.cursor];
        let mut block = DataBlock::new(self.exprs.len());
        block.push_row(accs.iter().map(|a| a.finalize()).collect());
        self.cursor += 1;
        Ok(PullOutcome::Ready { block, new_group: true })
    }

    fn output_columns(&self) -> usize {
        self.exprs.len()
    }

    fn is_killed(&self) -> bool {
        self.child.is_killed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::agg::AggFunc;

    struct VecOperator {
        blocks: Vec<DataBlock>,
        idx: usize,
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
            2
        }
    }

    #[test]
    fn float_group_column_rejected() {
        let mut block = DataBlock::new(2);
        block.push_row(vec![ColumnValue::Double(1.0), ColumnValue::Integer(1)]);
        let child = VecOperator { blocks: vec![block], idx: 0 };
        let mut gb = GroupByOperator::new(Box::new(child), 0, vec![AggExpr { input_column: 1, func: AggFunc::Sum }]);
        assert!(gb.pull().is_err());
    }

    #[test]
    fn groups_rows_by_key() {
        let mut block = DataBlock::new(2);
        for (g, v) in [(1, 10), (2, 20), (1, 30)] {
            block.push_row(vec![ColumnValue::Integer(g), ColumnValue::Integer(v)]);
        }
        let child = VecOperator { blocks: vec![block], idx: 0 };
        let mut gb = GroupByOperator::new(Box::new(child), 0, vec![AggExpr { input_column: 1, func: AggFunc::Sum }]);
        let PullOutcome::Ready { block: g1, .. } = gb.pull().unwrap() else { panic!() };
        assert_eq!(g1.columns[0].values[0], ColumnValue::Double(40.0));
        let PullOutcome::Ready { block: g2, .. } = gb.pull().unwrap() else { panic!() };
        assert_eq!(g2.columns[0].values[0], ColumnValue::Double(20.0));
        assert!(matches!(gb.pull().unwrap(), PullOutcome::Done));
    }
}
