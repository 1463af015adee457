//! Tally - Check/Report aggregation for service control clients.
//!
//! Tally sits between an API frontend and its control service. Repeated
//! Check calls are answered from a bounded cache that refreshes each verdict
//! at most once per interval, and Report calls with matching signatures are
//! merged locally and sent upstream in batches.
//!
//! # Architecture
//!
//! - `core`: operations, configuration, errors and the clock abstraction
//! - `signing`: SHA-256 signatures identifying mergeable operations
//! - `metrics`: metric values, distributions and money, with merge rules
//! - `cache`: the signature-keyed expiring cache with its overflow queue
//! - `aggregator`: the Check and Report aggregators
//! - `cli`: command-line replay of recorded call logs
//!
//! # Example
//!
//! ```no_run
//! use tally_lib::aggregator::{ReportAggregator, ReportOutcome};
//! use tally_lib::core::{KindMap, Operation, ReportOptions, ReportRequest};
//!
//! fn main() -> tally_lib::Result<()> {
//!     let options = ReportOptions::default();
//!     let reports = ReportAggregator::new("library.example.com", options, KindMap::new())?;
//!     let op = Operation::builder()
//!         .consumer_id("project:shelves")
//!         .operation_name("ListShelves")
//!         .build()?;
//!
//!     let req = ReportRequest::new("library.example.com", vec![op]);
//!     if reports.report(&req)? == ReportOutcome::SendDirect {
//!         // send `req` to the control service now
//!     }
//!
//!     // later, on a timer
//!     for batch in reports.flush() {
//!         // send `batch`
//!         let _ = batch;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod core;
pub mod metrics;
pub mod signing;

// Re-export core types for convenience
pub use crate::core::{Config, Result};
