//! State-window aggregate: like session-window, but the break condition is
//! a change in a designated column's value rather than a time gap, per
//! SPEC_FULL.md §4.4.

use crate::execution::agg::{AggAccumulator, AggExpr};
use crate::execution::block::DataBlock;
use crate::execution::interval::TimeWindow;
use crate::execution::operator::{check_killed, Operator, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

struct StateWindowState {
    window: TimeWindow,
    state_value: ColumnValue,
    accs: Vec<AggAccumulator>,
}

pub struct StateWindowOperator {
    child: Box<dyn Operator>,
    state_column: usize,
    exprs: Vec<AggExpr>,
    state: Option<StateWindowState>,
    output: std::collections::VecDeque<(ColumnValue, Vec<ColumnValue>)>,
    done_draining: bool,
}

impl StateWindowOperator {
    pub fn new(child: Box<dyn Operator>, state_column: usize, exprs: Vec<AggExpr>) -> Self {
        Self { child, state_column, exprs, state: None, output: std::collections::VecDeque::new(), done_draining: false }
    }

    fn new_accs(&self) -> Vec<AggAccumulator> {
        self.exprs.iter().map(|e| AggAccumulator::new(e.func)).collect()
    }

    fn close(&mut self) {
        if let Some(s) = self.state.take() {
            let values = s.accs.iter().map(|a| a.finalize()).collect();
            self.output.push_back((s.state_value, values));
        }
    }

    fn ingest_block(&mut self, block: &DataBlock) {
        for row in 0..block.row_count {
            let ts = block.timestamp_at(row);
            let value = block.columns[self.state_column].values[row].clone();
            let same_state = matches!(&self.state, Some(s) if s.state_value == value);
            if !same_state {
                self.close();
                self.state = Some(StateWindowState {
                    window: TimeWindow { skey: ts, ekey: ts },
                    state_value: value,
                    accs: self.new_accs(),
                });
            }
            let s = self.state.as_mut().unwrap();
            s.window.ekey = ts;
            for (acc, expr) in s.accs.iter_mut().zip(self.exprs.iter()) {
                acc.accumulate(&block.columns[expr.input_column].values[row]);
            }
        }
    }
}

impl Operator for StateWindowOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        check_killed(self.is_killed())?;
        while self.output.is_empty() && !self.done_draining {
            match self.child.pull()? {
                PullOutcome::Ready { block, .. } => self.ingest_block(&block),
                PullOutcome::Pending(d) => return Ok(PullOutcome::Pending(d)),
                PullOutcome::Done => {
                    self.close();
                    self.done_draining = true;
                }
            }
        }
        match self.output.pop_front() {
            Some((_, values)) => {
                let mut block = DataBlock::new(self.exprs.len());
                block.push_row(values);
                Ok(PullOutcome::Ready { block, new_group: true })
            }
            None => Ok(PullOutcome::Done),
        }
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
            3
        }
    }

    #[test]
    fn state_change_breaks_window() {
        let mut block = DataBlock::new(3);
        for (ts, state, v) in [(0, 1, 10), (1, 1, 20), (2, 2, 30)] {
            block.push_row(vec![
                ColumnValue::BigInt(ts),
                ColumnValue::Integer(state),
                ColumnValue::Integer(v),
            ]);
        }
        let child = VecOperator { blocks: vec![block], idx: 0 };
        let mut sw = StateWindowOperator::new(
            Box::new(child),
            1,
            vec![AggExpr { input_column: 2, func: AggFunc::Sum }],
        );
        let PullOutcome::Ready { block: first, .. } = sw.pull().unwrap() else { panic!() };
        assert_eq!(first.columns[0].values[0], ColumnValue::Double(30.0));
        let PullOutcome::Ready { block: second, .. } = sw.pull().unwrap() else { panic!() };
        assert_eq!(second.columns[0].values[0], ColumnValue::Double(30.0));
        assert!(matches!(sw.pull().unwrap(), PullOutcome::Done));
    }
}
