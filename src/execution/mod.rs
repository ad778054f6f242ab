pub mod expressions;
pub mod vectorized;

// Pull-based block-at-a-time operator tree: scheduler hands each vnode a
// sub-plan, and a Task drives its operator tree with one pull() per step.
pub mod agg;
pub mod block;
pub mod exchange;
pub mod fill;
pub mod groupby;
pub mod interval;
pub mod operator;
pub mod project;
pub mod scan;
pub mod session_window;
pub mod sort;
pub mod state_window;
pub mod storage;
pub mod task;

pub use expressions::{BinaryOperator, Expr, ExprValue, ExpressionEvaluator, UnaryOperator};
pub use vectorized::ColumnValue;

pub use agg::{AggAccumulator, AggExpr, AggFunc, AggregateOperator};
pub use block::{ColumnData, DataBlock};
pub use exchange::{ExchangeOperator, ExchangeSource, ExchangeStats, FetchDispatcher, RpcFetchDispatcher};
pub use fill::{FillOperator, FillPolicy};
pub use groupby::GroupByOperator;
pub use interval::{IntervalResultRow, IntervalWindowOperator, TimeWindow, DEFAULT_MAX_TIME_WINDOWS};
pub use operator::{check_killed, Operator, OperatorStatus, PullOutcome};
pub use project::{FilterOperator, LimitOperator, ProjectOperator};
pub use scan::{StreamScanOperator, TableScanOperator};
pub use session_window::SessionWindowOperator;
pub use sort::{SortKey, SortOperator};
pub use state_window::StateWindowOperator;
pub use storage::{BlockInfo, InMemoryStorageHandle, ScanCond, ScanOrder, StorageHandle};
pub use task::{Task, TaskOutcome};
