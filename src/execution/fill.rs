//! Fill operator, grounded on SPEC_FULL.md §4.4: inserts missing rows per a
//! configured policy (none / value / linear / prev / next). It sits
//! directly on top of an `IntervalWindowOperator` built with
//! `all_interval = true`, since only that mode synthesizes the empty
//! placeholder windows a fill policy has something to act on.

use std::collections::VecDeque;

use crate::execution::block::DataBlock;
use crate::execution::interval::{IntervalResultRow, IntervalWindowOperator};
use crate::execution::operator::{Operator, PullOutcome};
use crate::execution::vectorized::ColumnValue;
use crate::Result;

/// Fill policy applied to a synthesized empty interval window.
#[derive(Debug, Clone)]
pub enum FillPolicy {
    /// Drop empty windows entirely (no output row for them).
    None,
    /// Fill every column of an empty window with a fixed value.
    Value(ColumnValue),
    /// Linearly interpolate between the surrounding real windows.
    Linear,
    /// Carry the previous real window's values forward.
    Prev,
    /// Carry the next real window's values backward.
    Next,
}

fn interpolate_value(prev: &ColumnValue, next: &ColumnValue, ratio: f64) -> ColumnValue {
    match (prev, next) {
        (ColumnValue::Integer(a), ColumnValue::Integer(b)) => {
            ColumnValue::Double(*a as f64 + (*b - *a) as f64 * ratio)
        }
        (ColumnValue::BigInt(a), ColumnValue::BigInt(b)) => {
            ColumnValue::Double(*a as f64 + (*b - *a) as f64 * ratio)
        }
        (ColumnValue::Float(a), ColumnValue::Float(b)) => {
            ColumnValue::Double(*a as f64 + (*b - *a) as f64 * ratio)
        }
        (ColumnValue::Double(a), ColumnValue::Double(b)) => ColumnValue::Double(a + (b - a) * ratio),
        _ => prev.clone(),
    }
}

fn interpolate_row(prev: &[ColumnValue], next: &[ColumnValue], ratio: f64) -> Vec<ColumnValue> {
    prev.iter()
        .zip(next.iter())
        .map(|(p, n)| interpolate_value(p, n, ratio))
        .collect()
}

/// Streaming fill over an interval-window child. A run of consecutive empty
/// windows under `Linear`/`Next` policy is buffered until the next real
/// window resolves them (per SPEC_FULL.md's "mid-fill buffered, resumed
/// after the previous group finishes" contract); `Prev`/`Value`/`None`
/// resolve immediately, needing no lookahead.
pub struct FillOperator {
    child: IntervalWindowOperator,
    policy: FillPolicy,
    last_real: Option<Vec<ColumnValue>>,
    pending: VecDeque<IntervalResultRow>,
    output: VecDeque<IntervalResultRow>,
    child_done: bool,
}

impl FillOperator {
    pub fn new(child: IntervalWindowOperator, policy: FillPolicy) -> Self {
        Self {
            child,
            policy,
            last_real: None,
            pending: VecDeque::new(),
            output: VecDeque::new(),
            child_done: false,
        }
    }

    fn resolve_pending_against_next(&mut self, next_values: &[ColumnValue]) {
        let n = self.pending.len();
        let prev_values = self.last_real.clone();
        for (i, mut row) in self.pending.drain(..).enumerate() {
            row.values = match &self.policy {
                FillPolicy::Next => next_values.to_vec(),
                FillPolicy::Linear => {
                    let ratio = (i + 1) as f64 / (n + 1) as f64;
                    let prev = prev_values.clone().unwrap_or_else(|| next_values.to_vec());
                    interpolate_row(&prev, next_values, ratio)
                }
                _ => unreachable!("only Next/Linear buffer pending rows"),
            };
            row.is_empty = false;
            self.output.push_back(row);
        }
    }

    /// At end-of-stream a buffered run of empties has no following real
    /// window to resolve against; there is nothing to interpolate toward,
    /// so those windows are dropped rather than guessed at.
    fn drop_unresolved_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pull_row(&mut self) -> Result<Option<IntervalResultRow>> {
        loop {
            if let Some(row) = self.output.pop_front() {
                return Ok(Some(row));
            }
            if self.child_done {
                self.drop_unresolved_pending();
                return Ok(None);
            }
            match self.child.pull_row()? {
                Some(row) if !row.is_empty => {
                    if !self.pending.is_empty() {
                        self.resolve_pending_against_next(&row.values);
                    }
                    self.last_real = Some(row.values.clone());
                    self.output.push_back(row);
                }
                Some(row) => match &self.policy {
                    FillPolicy::None => {}
                    FillPolicy::Value(v) => {
                        let mut r = row;
                        r.values = r.values.iter().map(|_| v.clone()).collect();
                        r.is_empty = false;
                        self.output.push_back(r);
                    }
                    FillPolicy::Prev => {
                        if let Some(ref prev) = self.last_real {
                            let mut r = row;
                            r.values = prev.clone();
                            r.is_empty = false;
                            self.output.push_back(r);
                        }
                        // No prior real window yet: nothing to carry forward, drop.
                    }
                    FillPolicy::Next | FillPolicy::Linear => {
                        self.pending.push_back(row);
                    }
                },
                None => {
                    self.child_done = true;
                }
            }
        }
    }
}

impl Operator for FillOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        match self.pull_row()? {
            Some(row) => {
                let mut block = DataBlock::new(row.values.len());
                block.push_row(row.values);
                Ok(PullOutcome::Ready { block, new_group: true })
            }
            None => Ok(PullOutcome::Done),
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
    use crate::execution::agg::{AggExpr, AggFunc};

    struct Feed {
        rows: VecDeque<(i64, f64)>,
    }

    impl Operator for Feed {
        fn pull(&mut self) -> Result<PullOutcome> {
            match self.rows.pop_front() {
                Some((ts, v)) => {
                    let mut block = DataBlock::new(2);
                    block.push_row(vec![ColumnValue::BigInt(ts), ColumnValue::Double(v)]);
                    Ok(PullOutcome::Ready { block, new_group: false })
                }
                None => Ok(PullOutcome::Done),
            }
        }

        fn output_columns(&self) -> usize {
            2
        }
    }

    fn feed() -> Feed {
        Feed { rows: VecDeque::from(vec![(0, 10.0), (2, 20.0), (4, 30.0)]) }
    }

    #[test]
    fn prev_fill_matches_scenario_3() {
        let interval_op = IntervalWindowOperator::new(
            Box::new(feed()),
            1,
            vec![AggExpr { input_column: 1, func: AggFunc::Avg }],
            true,
        );
        let mut fill = FillOperator::new(interval_op, FillPolicy::Prev);
        let mut out = Vec::new();
        while let Some(row) = fill.pull_row().unwrap() {
            match row.values[0] {
                ColumnValue::Double(v) => out.push(v),
                other => panic!("unexpected value {other:?}"),
            }
        }
        assert_eq!(out, vec![10.0, 10.0, 20.0, 20.0, 30.0]);
    }

    #[test]
    fn none_policy_drops_empty_windows() {
        let interval_op = IntervalWindowOperator::new(
            Box::new(feed()),
            1,
            vec![AggExpr { input_column: 1, func: AggFunc::Avg }],
            true,
        );
        let mut fill = FillOperator::new(interval_op, FillPolicy::None);
        let mut out = Vec::new();
        while let Some(row) = fill.pull_row().unwrap() {
            match row.values[0] {
                ColumnValue::Double(v) => out.push(v),
                other => panic!("unexpected value {other:?}"),
            }
        }
        assert_eq!(out, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn linear_fill_interpolates_between_real_windows() {
        let interval_op = IntervalWindowOperator::new(
            Box::new(feed()),
            1,
            vec![AggExpr { input_column: 1, func: AggFunc::Avg }],
            true,
        );
        let mut fill = FillOperator::new(interval_op, FillPolicy::Linear);
        let mut out = Vec::new();
        while let Some(row) = fill.pull_row().unwrap() {
            match row.values[0] {
                ColumnValue::Double(v) => out.push(v),
                other => panic!("unexpected value {other:?}"),
            }
        }
        assert_eq!(out, vec![10.0, 15.0, 20.0, 25.0, 30.0]);
    }
}
