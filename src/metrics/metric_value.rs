//! Metric values and their kind-dependent merge rules.

use crate::core::{MetricKind, Result, TallyError};
use crate::metrics::distribution::{self, Distribution};
use crate::metrics::money::{self, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The payload of a metric value; exactly one kind per value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int64(i64),
    Double(f64),
    Money(Money),
    Distribution(Distribution),
    String(String),
    Bool(bool),
}

impl Value {
    /// Variant name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::Money(_) => "money",
            Value::Distribution(_) => "distribution",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
        }
    }
}

/// A single measurement with its labels and time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Labels distinguishing this value from others of the same metric
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Start of the measured window
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// End of the measured window
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// The measurement
    pub value: Value,
}

impl MetricValue {
    pub fn new(value: Value) -> Self {
        Self {
            labels: HashMap::new(),
            start_time: None,
            end_time: None,
            value,
        }
    }

    pub fn int64(value: i64) -> Self {
        Self::new(Value::Int64(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(Value::Double(value))
    }

    pub fn money(value: Money) -> Self {
        Self::new(Value::Money(value))
    }

    pub fn distribution(value: Distribution) -> Self {
        Self::new(Value::Distribution(value))
    }

    pub fn string<S: Into<String>>(value: S) -> Self {
        Self::new(Value::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Value::Bool(value))
    }

    pub fn with_label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_interval(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Currency of a money value, which takes part in its signature
    pub fn currency_code(&self) -> Option<&str> {
        match &self.value {
            Value::Money(m) => Some(m.currency_code.as_str()),
            _ => None,
        }
    }
}

/// Merge `prior` into `latest` according to `kind`.
///
/// `Delta` adds the values and widens the time window to cover both.
/// `Gauge` and `Cumulative` keep whichever value ends later; `latest` wins
/// ties and values without an end time. On error `latest` is unchanged.
pub fn merge(kind: MetricKind, prior: &MetricValue, latest: &mut MetricValue) -> Result<()> {
    if std::mem::discriminant(&prior.value) != std::mem::discriminant(&latest.value) {
        return Err(TallyError::merge(format!(
            "the latest metric value has a different type: {} vs {}",
            prior.value.type_name(),
            latest.value.type_name()
        )));
    }

    match kind {
        MetricKind::Delta => merge_delta(prior, latest),
        MetricKind::Gauge | MetricKind::Cumulative => {
            if let (Some(prior_end), Some(latest_end)) = (prior.end_time, latest.end_time) {
                if prior_end > latest_end {
                    *latest = prior.clone();
                }
            }
            Ok(())
        }
    }
}

fn merge_delta(prior: &MetricValue, latest: &mut MetricValue) -> Result<()> {
    let combined = match (&prior.value, &latest.value) {
        (Value::Int64(a), Value::Int64(b)) => Value::Int64(
            a.checked_add(*b).ok_or_else(|| {
                TallyError::overflow(format!("int64 delta overflow: {} + {}", a, b))
            })?,
        ),
        (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (Value::Money(a), Value::Money(b)) => Value::Money(money::add(a, b, true)?),
        (Value::Distribution(a), Value::Distribution(b)) => {
            let mut merged = b.clone();
            distribution::merge(a, &mut merged)?;
            Value::Distribution(merged)
        }
        (other, _) => {
            return Err(TallyError::merge(format!(
                "unmergeable metric type {}",
                other.type_name()
            )))
        }
    };

    latest.value = combined;
    if let Some(prior_start) = prior.start_time {
        if latest.start_time.map_or(true, |start| prior_start < start) {
            latest.start_time = Some(prior_start);
        }
    }
    if let Some(prior_end) = prior.end_time {
        if latest.end_time.map_or(true, |end| end < prior_end) {
            latest.end_time = Some(prior_end);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_delta_adds_and_widens() {
        let prior = MetricValue::int64(3).with_interval(at(0), at(10));
        let mut latest = MetricValue::int64(4).with_interval(at(5), at(20));

        merge(MetricKind::Delta, &prior, &mut latest).unwrap();
        assert_eq!(latest.value, Value::Int64(7));
        assert_eq!(latest.start_time, Some(at(0)));
        assert_eq!(latest.end_time, Some(at(20)));
    }

    #[test]
    fn test_delta_fills_missing_times() {
        let prior = MetricValue::double(1.5).with_interval(at(1), at(2));
        let mut latest = MetricValue::double(2.0);

        merge(MetricKind::Delta, &prior, &mut latest).unwrap();
        assert_eq!(latest.value, Value::Double(3.5));
        assert_eq!(latest.start_time, Some(at(1)));
        assert_eq!(latest.end_time, Some(at(2)));
    }

    #[test]
    fn test_delta_money_saturates() {
        let prior = MetricValue::money(Money::new("USD", i64::MAX, 600_000_000));
        let mut latest = MetricValue::money(Money::new("USD", 0, 500_000_000));

        merge(MetricKind::Delta, &prior, &mut latest).unwrap();
        assert_eq!(
            latest.value,
            Value::Money(Money::new("USD", i64::MAX, money::MAX_NANOS))
        );
    }

    #[test]
    fn test_delta_distribution() {
        let mut a = Distribution::create_explicit(&[1.0]).unwrap();
        a.add_sample(0.5).unwrap();
        let mut b = Distribution::create_explicit(&[1.0]).unwrap();
        b.add_sample(2.0).unwrap();

        let prior = MetricValue::distribution(a);
        let mut latest = MetricValue::distribution(b);
        merge(MetricKind::Delta, &prior, &mut latest).unwrap();

        match &latest.value {
            Value::Distribution(d) => {
                assert_eq!(d.count(), 2);
                assert_eq!(d.bucket_counts(), &[1, 1]);
            }
            other => panic!("expected distribution, got {:?}", other),
        }
    }

    #[test]
    fn test_int_overflow_is_reported() {
        let prior = MetricValue::int64(i64::MAX);
        let mut latest = MetricValue::int64(1);
        let err = merge(MetricKind::Delta, &prior, &mut latest).unwrap_err();
        assert_eq!(err.category(), "overflow");
        assert_eq!(latest.value, Value::Int64(1));
    }

    #[test]
    fn test_gauge_keeps_later_end_time() {
        let newer = MetricValue::int64(10).with_interval(at(0), at(30));
        let older = MetricValue::int64(99).with_interval(at(0), at(10));

        let mut latest = older.clone();
        merge(MetricKind::Gauge, &newer, &mut latest).unwrap();
        assert_eq!(latest, newer);

        let mut latest = newer.clone();
        merge(MetricKind::Cumulative, &older, &mut latest).unwrap();
        assert_eq!(latest, newer);
    }

    #[test]
    fn test_type_mismatch_is_merge_error() {
        let prior = MetricValue::int64(1);
        let mut latest = MetricValue::double(1.0);
        let err = merge(MetricKind::Delta, &prior, &mut latest).unwrap_err();
        assert_eq!(err.category(), "merge");

        let err = merge(MetricKind::Gauge, &prior, &mut latest).unwrap_err();
        assert_eq!(err.category(), "merge");
    }

    #[test]
    fn test_strings_and_bools_do_not_sum() {
        let mut latest = MetricValue::string("b");
        assert!(merge(MetricKind::Delta, &MetricValue::string("a"), &mut latest).is_err());

        let mut latest = MetricValue::bool(true);
        assert!(merge(MetricKind::Delta, &MetricValue::bool(false), &mut latest).is_err());

        let mut latest = MetricValue::bool(true).with_interval(at(0), at(5));
        let prior = MetricValue::bool(false).with_interval(at(0), at(9));
        merge(MetricKind::Gauge, &prior, &mut latest).unwrap();
        assert_eq!(latest.value, Value::Bool(false));
    }
}
