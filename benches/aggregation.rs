//! Aggregation hot path benchmarks.
//!
//! Signing runs on every Check and Report, so it dominates the per-call
//! cost; cache hits and report merges come right after.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tally_lib::aggregator::{CheckAggregator, ReportAggregator};
use tally_lib::core::{
    CheckOptions, CheckRequest, CheckResponse, KindMap, ManualClock, Operation, ReportOptions,
    ReportRequest,
};
use tally_lib::metrics::{Distribution, MetricValue};
use tally_lib::signing::{sign_check, sign_report};

const SERVICE: &str = "library.example.com";

fn operation(consumer: usize, labels: usize) -> Operation {
    let mut builder = Operation::builder()
        .consumer_id(format!("project:consumer-{}", consumer))
        .operation_name("google.example.library.v1.LibraryService.ListShelves")
        .metric_value("request_count", MetricValue::int64(1))
        .metric_value("response_code", MetricValue::int64(1).with_label("code", "200"));
    for i in 0..labels {
        builder = builder.label(format!("label-{}", i), format!("value-{}", i));
    }
    builder.build().unwrap()
}

fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("signing");

    for labels in [0usize, 8, 32] {
        let op = operation(1, labels);
        group.bench_with_input(BenchmarkId::new("sign_check", labels), &op, |b, op| {
            b.iter(|| black_box(sign_check(black_box(op)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("sign_report", labels), &op, |b, op| {
            b.iter(|| black_box(sign_report(black_box(op)).unwrap()));
        });
    }

    group.finish();
}

fn bench_check_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_cache");
    let clock = Arc::new(ManualClock::new());
    let options =
        CheckOptions::new(10_000, Duration::from_secs(3600), Duration::from_secs(7200)).unwrap();
    let checks = CheckAggregator::with_clock(SERVICE, options, KindMap::new(), clock).unwrap();

    let requests: Vec<CheckRequest> = (0..1000)
        .map(|n| CheckRequest::new(SERVICE, operation(n, 4)))
        .collect();
    for req in &requests {
        checks.add_response(req, CheckResponse::ok("warm")).unwrap();
    }

    group.bench_function("hit_1000", |b| {
        b.iter(|| {
            for req in &requests {
                black_box(checks.check(req).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_report_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_merge");

    group.bench_function("merge_10_signatures", |b| {
        let clock = Arc::new(ManualClock::new());
        let options = ReportOptions::new(1000, Duration::from_secs(3600)).unwrap();
        let reports =
            ReportAggregator::with_clock(SERVICE, options, KindMap::new(), clock).unwrap();
        let req = ReportRequest::new(SERVICE, (0..10).map(|n| operation(n, 4)).collect());
        b.iter(|| black_box(reports.report(&req).unwrap()));
    });

    group.bench_function("distribution_samples_1000", |b| {
        b.iter(|| {
            let mut dist = Distribution::create_exponential(20, 2.0, 1e-3).unwrap();
            for i in 0..1000 {
                dist.add_sample(black_box(f64::from(i) * 0.37)).unwrap();
            }
            black_box(dist)
        });
    });

    group.finish();
}

criterion_group! {
    name = aggregation;
    config = Criterion::default()
        .significance_level(0.01)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2));
    targets = bench_signing,
              bench_check_hits,
              bench_report_merge
}

criterion_main!(aggregation);
