use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::error::{Result, TallyError};
use crate::metrics::MetricValue;

/// How urgently an operation must reach the control service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// May be served from cache and aggregated
    #[default]
    Low,
    /// Must be sent to the network directly
    High,
}

/// Merge semantics of a metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Values are summed across merges
    #[default]
    Delta,
    /// Latest value by end time wins
    Gauge,
    /// Latest value by end time wins
    Cumulative,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Delta => "delta",
            MetricKind::Gauge => "gauge",
            MetricKind::Cumulative => "cumulative",
        };
        f.write_str(name)
    }
}

/// Merge semantics keyed by metric name, injected into aggregators at construction.
///
/// Names that are not registered merge as [`MetricKind::Delta`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindMap(HashMap<String, MetricKind>);

impl KindMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a metric's kind, replacing any previous entry
    pub fn insert<S: Into<String>>(&mut self, metric_name: S, kind: MetricKind) {
        self.0.insert(metric_name.into(), kind);
    }

    /// Returns the kind for a metric, `Delta` when unregistered
    pub fn kind_of(&self, metric_name: &str) -> MetricKind {
        self.0.get(metric_name).copied().unwrap_or_default()
    }

    /// Registered metric names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, MetricKind)> for KindMap {
    fn from_iter<I: IntoIterator<Item = (S, MetricKind)>>(iter: I) -> Self {
        KindMap(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    #[default]
    Default,
    Debug,
    Info,
    Warning,
    Error,
}

/// A log line attached to an operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// Log name
    pub name: String,
    /// When the entry was produced
    pub timestamp: Option<DateTime<Utc>>,
    /// Entry severity
    pub severity: LogSeverity,
    /// Free-form payload
    pub text_payload: String,
    /// Entry labels
    pub labels: HashMap<String, String>,
}

impl LogEntry {
    /// Creates a text log entry stamped with the current time
    pub fn text<N: Into<String>, T: Into<String>>(name: N, text: T) -> Self {
        LogEntry {
            name: name.into(),
            timestamp: Some(Utc::now()),
            text_payload: text.into(),
            ..Default::default()
        }
    }
}

/// All values recorded for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValueSet {
    /// Metric name
    pub metric_name: String,
    /// Recorded values
    pub metric_values: Vec<MetricValue>,
}

impl MetricValueSet {
    /// Creates a value set
    pub fn new<S: Into<String>>(metric_name: S, metric_values: Vec<MetricValue>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_values,
        }
    }
}

/// One API call's identity plus its metric and log payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    /// Caller-assigned id, not part of any signature
    pub operation_id: String,
    /// Consumer identity, e.g. `project:my-project`
    pub consumer_id: String,
    /// Fully qualified method name
    pub operation_name: String,
    /// When the call started
    pub start_time: Option<DateTime<Utc>>,
    /// When the call finished
    pub end_time: Option<DateTime<Utc>>,
    /// Operation labels
    pub labels: HashMap<String, String>,
    /// Metric payload
    pub metric_value_sets: Vec<MetricValueSet>,
    /// Log payload
    pub log_entries: Vec<LogEntry>,
    /// Whether the operation may be cached
    pub importance: Importance,
}

impl Operation {
    /// Creates a new operation builder
    pub fn builder() -> OperationBuilder {
        OperationBuilder::default()
    }

    /// Fails unless the identity fields used for signing are present
    pub fn validate(&self) -> Result<()> {
        if self.operation_name.is_empty() {
            return Err(TallyError::validation("operation_name is required"));
        }
        if self.consumer_id.is_empty() {
            return Err(TallyError::validation("consumer_id is required"));
        }
        Ok(())
    }

    /// Returns true if the operation may be served from or merged into a cache
    pub fn is_low_importance(&self) -> bool {
        self.importance == Importance::Low
    }

    /// Values recorded for a metric, if any
    pub fn metric_values(&self, metric_name: &str) -> Option<&[MetricValue]> {
        self.metric_value_sets
            .iter()
            .find(|set| set.metric_name == metric_name)
            .map(|set| set.metric_values.as_slice())
    }

    /// Gets a label value by key
    pub fn get_label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Builder for creating Operation instances
#[derive(Default)]
pub struct OperationBuilder {
    operation_id: Option<String>,
    consumer_id: Option<String>,
    operation_name: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    labels: HashMap<String, String>,
    metric_value_sets: Vec<MetricValueSet>,
    log_entries: Vec<LogEntry>,
    importance: Importance,
}

impl OperationBuilder {
    pub fn operation_id<S: Into<String>>(mut self, id: S) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn consumer_id<S: Into<String>>(mut self, consumer_id: S) -> Self {
        self.consumer_id = Some(consumer_id.into());
        self
    }

    pub fn operation_name<S: Into<String>>(mut self, operation_name: S) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    pub fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Appends a value to the named metric's set, creating the set on first use
    pub fn metric_value<S: Into<String>>(mut self, metric_name: S, value: MetricValue) -> Self {
        let metric_name = metric_name.into();
        match self
            .metric_value_sets
            .iter_mut()
            .find(|set| set.metric_name == metric_name)
        {
            Some(set) => set.metric_values.push(value),
            None => self
                .metric_value_sets
                .push(MetricValueSet::new(metric_name, vec![value])),
        }
        self
    }

    pub fn log_entry(mut self, entry: LogEntry) -> Self {
        self.log_entries.push(entry);
        self
    }

    pub fn importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn build(self) -> Result<Operation> {
        let operation = Operation {
            operation_id: self.operation_id.unwrap_or_default(),
            consumer_id: self
                .consumer_id
                .ok_or_else(|| TallyError::validation("consumer_id is required"))?,
            operation_name: self
                .operation_name
                .ok_or_else(|| TallyError::validation("operation_name is required"))?,
            start_time: self.start_time,
            end_time: self.end_time,
            labels: self.labels,
            metric_value_sets: self.metric_value_sets,
            log_entries: self.log_entries,
            importance: self.importance,
        };
        operation.validate()?;
        Ok(operation)
    }
}

/// A Check call destined for the control service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Managed service name
    pub service_name: String,
    /// The operation being checked
    pub operation: Operation,
}

impl CheckRequest {
    pub fn new<S: Into<String>>(service_name: S, operation: Operation) -> Self {
        Self {
            service_name: service_name.into(),
            operation,
        }
    }
}

/// One reason a Check was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckError {
    /// Machine-readable code, e.g. `PROJECT_DELETED`
    pub code: String,
    /// Human-readable detail
    pub detail: String,
}

/// The control service's answer to a Check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckResponse {
    /// Echo of the checked operation id
    pub operation_id: String,
    /// Refusal reasons; empty when the call is allowed
    pub check_errors: Vec<CheckError>,
}

impl CheckResponse {
    /// A response with no check errors
    pub fn ok<S: Into<String>>(operation_id: S) -> Self {
        Self {
            operation_id: operation_id.into(),
            check_errors: Vec::new(),
        }
    }

    /// A response carrying one check error
    pub fn error<S: Into<String>, C: Into<String>, D: Into<String>>(
        operation_id: S,
        code: C,
        detail: D,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            check_errors: vec![CheckError {
                code: code.into(),
                detail: detail.into(),
            }],
        }
    }

    /// Returns true if the response carries check errors
    pub fn has_errors(&self) -> bool {
        !self.check_errors.is_empty()
    }
}

/// A Report call destined for the control service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Managed service name
    pub service_name: String,
    /// Operations being reported
    pub operations: Vec<Operation>,
}

impl ReportRequest {
    pub fn new<S: Into<String>>(service_name: S, operations: Vec<Operation>) -> Self {
        Self {
            service_name: service_name.into(),
            operations,
        }
    }

    /// Returns true if every operation may be aggregated
    pub fn is_low_importance(&self) -> bool {
        self.operations.iter().all(Operation::is_low_importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_builder() {
        let op = Operation::builder()
            .operation_id("op-1")
            .consumer_id("project:shelves")
            .operation_name("ListShelves")
            .label("cloud.googleapis.com/location", "us-central1")
            .metric_value("quota_used", MetricValue::int64(1))
            .metric_value("quota_used", MetricValue::int64(2))
            .build()
            .unwrap();

        assert_eq!(op.operation_name, "ListShelves");
        assert_eq!(op.get_label("cloud.googleapis.com/location"), Some("us-central1"));
        assert_eq!(op.metric_value_sets.len(), 1);
        assert_eq!(op.metric_values("quota_used").map(<[_]>::len), Some(2));
        assert!(op.is_low_importance());
    }

    #[test]
    fn test_operation_builder_requires_identity() {
        assert!(Operation::builder().operation_name("ListShelves").build().is_err());
        assert!(Operation::builder().consumer_id("project:shelves").build().is_err());
        assert!(Operation::builder()
            .consumer_id("")
            .operation_name("ListShelves")
            .build()
            .is_err());
    }

    #[test]
    fn test_kind_map_defaults_to_delta() {
        let kinds: KindMap = vec![("latency", MetricKind::Cumulative)].into_iter().collect();
        assert_eq!(kinds.kind_of("latency"), MetricKind::Cumulative);
        assert_eq!(kinds.kind_of("request_count"), MetricKind::Delta);
        assert_eq!(kinds.len(), 1);
    }

    #[test]
    fn test_report_request_importance() {
        let low = Operation::builder()
            .consumer_id("project:a")
            .operation_name("Get")
            .build()
            .unwrap();
        let high = Operation {
            importance: Importance::High,
            ..low.clone()
        };
        assert!(ReportRequest::new("svc", vec![low.clone()]).is_low_importance());
        assert!(!ReportRequest::new("svc", vec![low, high]).is_low_importance());
    }

    #[test]
    fn test_check_response_errors() {
        assert!(!CheckResponse::ok("op").has_errors());
        assert!(CheckResponse::error("op", "PROJECT_DELETED", "gone").has_errors());
    }
}
