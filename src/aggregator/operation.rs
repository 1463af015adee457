//! Merging operations that share a signature.

use crate::core::{KindMap, MetricValueSet, Operation, Result};
use crate::metrics::metric_value::{self, MetricValue};
use crate::signing::{sign_metric_value, Signature};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accumulates operations into one.
///
/// Metric values are grouped first by metric name and then by
/// [`sign_metric_value`]; values landing in the same group are merged with
/// the kind the [`KindMap`] assigns to that metric.
#[derive(Debug, Clone)]
pub struct OperationAggregator {
    op: Operation,
    values: BTreeMap<String, BTreeMap<Signature, MetricValue>>,
    kinds: Arc<KindMap>,
}

impl OperationAggregator {
    /// Start aggregating from `initial`. Fails if two of its own values
    /// cannot be merged.
    pub fn new(initial: &Operation, kinds: Arc<KindMap>) -> Result<Self> {
        let mut op = initial.clone();
        let sets = std::mem::take(&mut op.metric_value_sets);
        let mut aggregator = Self {
            op,
            values: BTreeMap::new(),
            kinds,
        };
        aggregator.merge_metric_values(&sets)?;
        Ok(aggregator)
    }

    /// Fold `other` into the aggregate. On error nothing changes.
    pub fn add(&mut self, other: &Operation) -> Result<()> {
        self.merge_metric_values(&other.metric_value_sets)?;
        self.op.log_entries.extend(other.log_entries.iter().cloned());
        self.op.start_time = earliest(self.op.start_time, other.start_time);
        self.op.end_time = latest(self.op.end_time, other.end_time);
        Ok(())
    }

    /// Snapshot of the aggregate. Metric value sets come out sorted by
    /// name, and values within a set by signature.
    pub fn as_operation(&self) -> Operation {
        let mut op = self.op.clone();
        op.metric_value_sets = self
            .values
            .iter()
            .map(|(name, by_signature)| {
                MetricValueSet::new(name.clone(), by_signature.values().cloned().collect())
            })
            .collect();
        op
    }

    pub fn operation_name(&self) -> &str {
        &self.op.operation_name
    }

    /// Number of distinct metric values held across all metrics
    pub fn metric_value_count(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    fn merge_metric_values(&mut self, sets: &[MetricValueSet]) -> Result<()> {
        // Merge into a staging map so a failure part way leaves `values` alone
        let mut staged: BTreeMap<(&str, Signature), MetricValue> = BTreeMap::new();
        for set in sets {
            let kind = self.kinds.kind_of(&set.metric_name);
            for value in &set.metric_values {
                let signature = sign_metric_value(value);
                let key = (set.metric_name.as_str(), signature);
                let mut merged = value.clone();
                let prior = staged.get(&key).or_else(|| {
                    self.values
                        .get(&set.metric_name)
                        .and_then(|by_signature| by_signature.get(&signature))
                });
                if let Some(prior) = prior {
                    metric_value::merge(kind, prior, &mut merged)?;
                }
                staged.insert(key, merged);
            }
        }

        for ((name, signature), value) in staged {
            self.values
                .entry(name.to_string())
                .or_default()
                .insert(signature, value);
        }
        Ok(())
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
