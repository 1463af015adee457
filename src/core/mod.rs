//! Core domain models, configuration and error handling for Tally.
//!
//! This module contains the request/operation types every other part of the
//! engine works on, plus the clock abstraction used for expiry decisions.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheOptions, CheckOptions, Config, ConfigBuilder, Eviction, LogLevel, LoggingConfig,
    ReportOptions,
};
pub use error::{Result, TallyError};
pub use types::{
    CheckError, CheckRequest, CheckResponse, Importance, KindMap, LogEntry, LogSeverity,
    MetricKind, MetricValueSet, Operation, OperationBuilder, ReportRequest,
};
