//! Replaying a recorded call log through both aggregators.
//!
//! Each record advances a manual clock, flushes whatever became due, then
//! issues its Check or Report. Checks that miss the cache are answered with
//! the response recorded alongside them, or an empty OK verdict.

use crate::aggregator::{CheckAggregator, ReportAggregator, ReportOutcome, StatsSnapshot};
use crate::core::{
    CheckRequest, CheckResponse, Clock, Config, ManualClock, Operation, ReportRequest, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One recorded API call
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    /// Time elapsed since the previous record
    #[serde(default, with = "humantime_serde")]
    pub after: Duration,
    /// The call itself
    #[serde(flatten)]
    pub call: ReplayCall,
}

/// Recorded call payloads
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ReplayCall {
    Check {
        operation: Operation,
        #[serde(default)]
        response: Option<CheckResponse>,
    },
    Report {
        operations: Vec<Operation>,
    },
}

/// How one Check was answered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub operation_id: String,
    pub from_cache: bool,
    pub response: CheckResponse,
}

/// Aggregator counters at the end of a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStats {
    pub check: StatsSnapshot,
    pub report: StatsSnapshot,
}

/// Everything a replay would have sent upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub checks: Vec<CheckOutcome>,
    pub check_flushes: Vec<CheckRequest>,
    pub reports: Vec<ReportRequest>,
    pub elapsed_ms: u128,
    pub stats: ReplayStats,
}

/// Parse a JSON array of records.
pub fn parse_records(json: &str) -> Result<Vec<ReplayRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Run `records` through fresh aggregators built from `config`.
pub fn replay(config: &Config, records: Vec<ReplayRecord>) -> Result<ReplaySummary> {
    let clock = Arc::new(ManualClock::new());
    let shared: Arc<dyn Clock> = Arc::<ManualClock>::clone(&clock);
    let checks = CheckAggregator::with_clock(
        config.service_name.as_str(),
        config.check,
        config.kinds.clone(),
        Arc::clone(&shared),
    )?;
    let reports = ReportAggregator::with_clock(
        config.service_name.as_str(),
        config.report,
        config.kinds.clone(),
        shared,
    )?;

    let mut summary = ReplaySummary {
        checks: Vec::new(),
        check_flushes: Vec::new(),
        reports: Vec::new(),
        elapsed_ms: 0,
        stats: ReplayStats {
            check: StatsSnapshot::default(),
            report: StatsSnapshot::default(),
        },
    };

    info!(records = records.len(), service = %config.service_name, "starting replay");
    for record in records {
        clock.advance(record.after);
        summary.check_flushes.extend(checks.flush());
        summary.reports.extend(reports.flush());

        match record.call {
            ReplayCall::Check { operation, response } => {
                let operation_id = operation.operation_id.clone();
                let req = CheckRequest::new(config.service_name.as_str(), operation);
                let outcome = match checks.check(&req)? {
                    Some(cached) => CheckOutcome {
                        operation_id,
                        from_cache: true,
                        response: cached,
                    },
                    None => {
                        let live =
                            response.unwrap_or_else(|| CheckResponse::ok(operation_id.as_str()));
                        checks.add_response(&req, live.clone())?;
                        CheckOutcome {
                            operation_id,
                            from_cache: false,
                            response: live,
                        }
                    }
                };
                summary.checks.push(outcome);
            }
            ReplayCall::Report { operations } => {
                let req = ReportRequest::new(config.service_name.as_str(), operations);
                if reports.report(&req)? == ReportOutcome::SendDirect {
                    debug!(operations = req.operations.len(), "report sent direct");
                    summary.reports.push(req);
                }
            }
        }
    }

    // Let everything cached age out, then drain what remains
    if let Some(expiration) = checks.expiration() {
        clock.advance(expiration);
    }
    summary.check_flushes.extend(checks.flush());
    summary.reports.extend(reports.flush());
    summary.reports.extend(reports.clear());
    checks.clear();

    summary.elapsed_ms = clock.elapsed().as_millis();
    summary.stats = ReplayStats {
        check: checks.stats(),
        report: reports.stats(),
    };
    info!(
        checks = summary.checks.len(),
        report_batches = summary.reports.len(),
        "replay finished"
    );
    Ok(summary)
}
