//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tally_lib::aggregator::{CheckAggregator, ReportAggregator};
use tally_lib::core::{
    CheckOptions, CheckRequest, Importance, KindMap, LogEntry, ManualClock, Operation,
    ReportOptions,
};
use tally_lib::metrics::MetricValue;

pub const SERVICE: &str = "library.example.com";
pub const QUOTA_METRIC: &str = "serviceruntime.googleapis.com/api/consumer/quota_used_count";

/// Test fixture builder for creating operations with sensible defaults.
pub struct TestOperationBuilder {
    consumer_num: usize,
    operation_name: String,
    labels: Vec<(String, String)>,
    metric_values: Vec<(String, MetricValue)>,
    log_text: Option<String>,
    importance: Importance,
}

impl TestOperationBuilder {
    pub fn new(consumer_num: usize) -> Self {
        Self {
            consumer_num,
            operation_name: "ListShelves".to_string(),
            labels: Vec::new(),
            metric_values: Vec::new(),
            log_text: None,
            importance: Importance::Low,
        }
    }

    pub fn operation(mut self, name: &str) -> Self {
        self.operation_name = name.to_string();
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.push((key.to_string(), value.to_string()));
        self
    }

    pub fn quota(self, amount: i64) -> Self {
        self.metric(QUOTA_METRIC, MetricValue::int64(amount))
    }

    pub fn metric(mut self, name: &str, value: MetricValue) -> Self {
        self.metric_values.push((name.to_string(), value));
        self
    }

    pub fn log(mut self, text: &str) -> Self {
        self.log_text = Some(text.to_string());
        self
    }

    pub fn high_importance(mut self) -> Self {
        self.importance = Importance::High;
        self
    }

    pub fn build(self) -> Operation {
        let mut builder = Operation::builder()
            .operation_id(format!("op-{:04}", self.consumer_num))
            .consumer_id(format!("project:consumer-{:04}", self.consumer_num))
            .operation_name(self.operation_name)
            .importance(self.importance);
        for (key, value) in self.labels {
            builder = builder.label(key, value);
        }
        for (name, value) in self.metric_values {
            builder = builder.metric_value(name, value);
        }
        if let Some(text) = self.log_text {
            builder = builder.log_entry(LogEntry::text("endpoints_log", text));
        }
        builder.build().unwrap()
    }

    pub fn check_request(self) -> CheckRequest {
        CheckRequest::new(SERVICE, self.build())
    }
}

/// Check aggregator on a manual clock.
pub fn check_aggregator(
    num_entries: i64,
    flush_interval: Duration,
    expiration: Duration,
) -> (Arc<ManualClock>, CheckAggregator) {
    let clock = Arc::new(ManualClock::new());
    let options = CheckOptions::new(num_entries, flush_interval, expiration).unwrap();
    let agg = CheckAggregator::with_clock(
        SERVICE,
        options,
        KindMap::new(),
        Arc::<ManualClock>::clone(&clock),
    )
    .unwrap();
    (clock, agg)
}

/// Report aggregator on a manual clock.
pub fn report_aggregator(
    num_entries: i64,
    flush_interval: Duration,
) -> (Arc<ManualClock>, ReportAggregator) {
    let clock = Arc::new(ManualClock::new());
    let options = ReportOptions::new(num_entries, flush_interval).unwrap();
    let agg = ReportAggregator::with_clock(
        SERVICE,
        options,
        KindMap::new(),
        Arc::<ManualClock>::clone(&clock),
    )
    .unwrap();
    (clock, agg)
}

/// Macro for creating a test operation quickly.
#[macro_export]
macro_rules! test_op {
    ($consumer:expr) => {
        TestOperationBuilder::new($consumer).build()
    };
    ($consumer:expr, quota: $amount:expr) => {
        TestOperationBuilder::new($consumer).quota($amount).build()
    };
    ($consumer:expr, high) => {
        TestOperationBuilder::new($consumer).high_importance().build()
    };
}
