//! Metric value types and the merge math behind aggregation.
//!
//! - `distribution`: bucketed histograms with online statistics
//! - `money`: currency amounts with overflow-aware addition
//! - `metric_value`: the tagged value union and delta/gauge merges

pub mod distribution;
pub mod metric_value;
pub mod money;

#[cfg(test)]
mod distribution_proptest;

pub use distribution::{BucketOptions, Distribution};
pub use metric_value::{MetricValue, Value};
pub use money::Money;
