//! Blocking aggregate operator: drains its child fully into a
//! `group-key -> ResultRow` hash table, then streams result blocks, per
//! SPEC_FULL.md §4.4. Grounded on the teacher's `executor::Executor`
//! aggregate handling, generalized to a per-expression accumulator with a
//! fixed intermediate layout and finalization hook (rather than the
//! teacher's ad-hoc `SqlStatement` match arms).

use std::collections::HashMap;

use crate::execution::block::DataBlock;
use crate::execution::operator::{check_killed, Operator, OperatorStatus, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

/// One aggregate function, matching the functions named in SPEC_FULL.md
/// §4.4 ("twa", "interp" get special interpolation handling in the
/// interval operator; this set covers the others).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

/// Per-row intermediate state for one aggregate expression over one group,
/// with a finalization hook (`finalize`) producing the output column
/// value — the fixed intermediate layout named in SPEC_FULL.md §4.4.
#[derive(Debug, Clone, Default)]
pub struct AggAccumulator {
    func: Option<AggFunc>,
    sum: f64,
    count: i64,
    min: Option<f64>,
    max: Option<f64>,
}

impl AggAccumulator {
    pub fn new(func: AggFunc) -> Self {
        Self { func: Some(func), ..Default::default() }
    }

    pub fn accumulate(&mut self, value: &ColumnValue) {
        let Some(n) = as_f64(value) else { return };
        self.sum += n;
        self.count += 1;
        self.min = Some(self.min.map_or(n, |m| m.min(n)));
        self.max = Some(self.max.map_or(n, |m| m.max(n)));
    }

    pub fn merge(&mut self, other: &AggAccumulator) {
        self.sum += other.sum;
        self.count += other.count;
        if let Some(m) = other.min {
            self.min = Some(self.min.map_or(m, |cur| cur.min(m)));
        }
        if let Some(m) = other.max {
            self.max = Some(self.max.map_or(m, |cur| cur.max(m)));
        }
    }

    pub fn finalize(&self) -> ColumnValue {
        match self.func {
            Some(AggFunc::Sum) => ColumnValue::Double(self.sum),
            Some(AggFunc::Count) => ColumnValue::BigInt(self.count),
            Some(AggFunc::Avg) => {
                if self.count == 0 {
                    ColumnValue::Null
                } else {
                    ColumnValue::Double(self.sum / self.count as f64)
                }
            }
            Some(AggFunc::Min) => self.min.map(ColumnValue::Double).unwrap_or(ColumnValue::Null),
            Some(AggFunc::Max) => self.max.map(ColumnValue::Double).unwrap_or(ColumnValue::Null),
            None => ColumnValue::Null,
        }
    }
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

/// One expression to evaluate per group: which input column to read and
/// which function to apply.
#[derive(Debug, Clone, Copy)]
pub struct AggExpr {
    pub input_column: usize,
    pub func: AggFunc,
}

/// Aggregate without windowing: one group (or one group per `group_column`
/// if set), draining the child operator entirely before returning any
/// results — the IN-EXECUTING -> RES-TO-RETURN -> DONE phase machine.
pub struct AggregateOperator {
    child: Box<dyn Operator>,
    exprs: Vec<AggExpr>,
    group_column: Option<usize>,
    status: OperatorStatus,
    groups: HashMap<Vec<u8>, Vec<AggAccumulator>>,
    group_order: Vec<Vec<u8>>,
    output_cursor: usize,
}

fn group_key(block: &DataBlock, row: usize, group_column: Option<usize>) -> Vec<u8> {
    match group_column {
        None => vec![0],
        Some(col) => format!("{:?}", block.columns[col].values[row]).into_bytes(),
    }
}

impl AggregateOperator {
    pub fn new(child: Box<dyn Operator>, exprs: Vec<AggExpr>, group_column: Option<usize>) -> Self {
        Self {
            child,
            exprs,
            group_column,
            status: OperatorStatus::Executing,
            groups: HashMap::new(),
            group_order: Vec::new(),
            output_cursor: 0,
        }
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            check_killed(self.child.is_killed())?;
            match self.child.pull()? {
                PullOutcome::Ready { block, .. } => {
                    for row in 0..block.row_count {
                        let key = group_key(&block, row, self.group_column);
                        let accs = self.groups.entry(key.clone()).or_insert_with(|| {
                            self.group_order.push(key.clone());
                            self.exprs.iter().map(|e| AggAccumulator::new(e.func)).collect()
                        });
                        for (acc, expr) in accs.iter_mut().zip(self.exprs.iter()) {
                            acc.accumulate(&block.columns[expr.input_column].values[row]);
                        }
                    }
                }
                PullOutcome::Pending(_) => continue,
                PullOutcome::Done => break,
            }
        }
        self.status = OperatorStatus::ResToReturn;
        Ok(())
    }
}

impl Operator for AggregateOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        if self.status == OperatorStatus::Executing {
            self.drain()?;
        }
        if self.status == OperatorStatus::Done {
            return Ok(PullOutcome::Done);
        }
        if self.output_cursor >= self.group_order.len() {
            self.status = OperatorStatus::Done;
            return Ok(PullOutcome::Done);
        }
        let key = &self.group_order[self.output_cursor];
        let accs = &self.groups[key];
        let mut block = DataBlock::new(self.exprs.len());
        block.push_row(accs.iter().map(|a| a.finalize()).collect());
        self.output_cursor += 1;
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
    use crate::execution::storage::{InMemoryStorageHandle, ScanCond, ScanOrder, StorageHandle};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

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
    fn sum_over_single_vnode_matches_scenario_1() {
        // spec.md §8 scenario 1: sum(v) for t=1..100, v=1..100 -> 5050.
        let mut handle = InMemoryStorageHandle::new(
            "t",
            (1..=100).map(|i| (i, vec![ColumnValue::Integer(i as i32)])).collect(),
            1000,
        );
        let cond = ScanCond { columns: vec![], order: ScanOrder::Asc, window_start: 0, window_end: 1000 };
        handle.query_tables(&cond).unwrap();
        handle.next_block().unwrap();
        let block = handle.retrieve_block().unwrap();

        let child = VecOperator { blocks: vec![block], idx: 0 };
        let mut agg = AggregateOperator::new(
            Box::new(child),
            vec![AggExpr { input_column: 1, func: AggFunc::Sum }],
            None,
        );
        let out = agg.pull().unwrap();
        let PullOutcome::Ready { block, .. } = out else { panic!("expected result row") };
        assert_eq!(block.columns[0].values[0], ColumnValue::Double(5050.0));
        assert!(matches!(agg.pull().unwrap(), PullOutcome::Done));
        let _ = killed_stub();
    }

    fn killed_stub() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }
}
