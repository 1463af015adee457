//! Check and Report aggregation.
//!
//! - `operation`: merges operations that share a signature
//! - `check`: caches Check verdicts and debounces refreshes
//! - `report`: batches Report operations between flushes
//! - `stats`: traffic counters exposed by both aggregators

pub mod check;
pub mod operation;
pub mod report;
pub mod stats;

pub use check::{CachedCheckItem, CheckAggregator};
pub use operation::OperationAggregator;
pub use report::{ReportAggregator, ReportOutcome, MAX_OPERATION_COUNT};
pub use stats::{AggregatorStats, StatsSnapshot};
