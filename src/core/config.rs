//! Configuration management for Tally.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Builder-style programmatic construction
//! - Validation and defaults
//!
//! Cache sizing follows one rule throughout: a non-positive `num_entries`
//! is not an error, it disables caching and every request goes to the
//! network.

use crate::core::types::{KindMap, MetricKind};
use crate::core::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Added to `flush_interval` when a check expiration is too short.
pub const EXPIRATION_FLOOR_MARGIN: Duration = Duration::from_millis(1);

/// Complete configuration for Tally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the managed service the aggregators report for
    pub service_name: String,
    /// Check cache configuration
    pub check: CheckOptions,
    /// Report cache configuration
    pub report: ReportOptions,
    /// Metric merge semantics keyed by metric name
    pub kinds: KindMap,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Options for the check aggregator cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOptions {
    /// Maximum cached check responses; `<= 0` disables caching
    pub num_entries: i64,
    /// Age after which a cached response triggers a refresh
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Age after which a cached response is evicted
    #[serde(with = "humantime_serde")]
    pub expiration: Duration,
}

/// Options for the report aggregator cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// Maximum pending report entries; `<= 0` disables caching
    pub num_entries: i64,
    /// Age after which pending usage becomes due for flushing
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

/// How a cache chooses entries to evict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Entries expire a fixed time after they were last set
    Ttl(Duration),
    /// Entries never expire; least recently used go first when full
    Lru,
}

/// Low-level cache sizing and eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Capacity; `<= 0` means no cache at all
    pub num_entries: i64,
    /// Eviction policy
    pub eviction: Eviction,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_name: "tally.example.com".to_string(),
            check: CheckOptions::default(),
            report: ReportOptions::default(),
            kinds: KindMap::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            num_entries: 200,
            flush_interval: Duration::from_millis(500),
            expiration: Duration::from_secs(1),
        }
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            num_entries: 200,
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl CheckOptions {
    /// Create validated options, raising `expiration` past `flush_interval` if needed.
    pub fn new(num_entries: i64, flush_interval: Duration, expiration: Duration) -> Result<Self> {
        let options = CheckOptions {
            num_entries,
            flush_interval,
            expiration,
        }
        .normalized();
        options.validate()?;
        Ok(options)
    }

    /// Ensure a cached response never expires before its refresh point.
    pub fn normalized(mut self) -> Self {
        if self.expiration <= self.flush_interval {
            self.expiration = self.flush_interval + EXPIRATION_FLOOR_MARGIN;
        }
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(TallyError::config("check flush_interval must be greater than 0"));
        }
        Ok(())
    }

    /// Whether these options produce a cache at all
    pub fn is_enabled(&self) -> bool {
        self.num_entries > 0
    }

    /// Cache options with the expiration floor applied
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            num_entries: self.num_entries,
            eviction: Eviction::Ttl(self.normalized().expiration),
        }
    }
}

impl ReportOptions {
    /// Create validated options
    pub fn new(num_entries: i64, flush_interval: Duration) -> Result<Self> {
        let options = ReportOptions {
            num_entries,
            flush_interval,
        };
        options.validate()?;
        Ok(options)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(TallyError::config("report flush_interval must be greater than 0"));
        }
        Ok(())
    }

    /// Whether these options produce a cache at all
    pub fn is_enabled(&self) -> bool {
        self.num_entries > 0
    }

    /// Pending entries become due once they have aged `flush_interval`.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            num_entries: self.num_entries,
            eviction: Eviction::Ttl(self.flush_interval),
        }
    }
}

impl CacheOptions {
    /// TTL-evicting cache options
    pub fn ttl(num_entries: i64, expiration: Duration) -> Self {
        CacheOptions {
            num_entries,
            eviction: Eviction::Ttl(expiration),
        }
    }

    /// LRU-evicting cache options
    pub fn lru(num_entries: i64) -> Self {
        CacheOptions {
            num_entries,
            eviction: Eviction::Lru,
        }
    }

    /// Capacity as a usize, or `None` when caching is disabled
    pub fn capacity(&self) -> Option<usize> {
        usize::try_from(self.num_entries).ok().filter(|n| *n > 0)
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(TallyError::config("service_name must not be empty"));
        }

        self.check.validate()?;
        self.report.validate()?;

        for name in self.kinds.names() {
            if name.is_empty() {
                return Err(TallyError::config("metric kind entries need a metric name"));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TallyError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the service name
    pub fn service_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set check cache capacity
    pub fn check_entries(mut self, num_entries: i64) -> Self {
        self.config.check.num_entries = num_entries;
        self
    }

    /// Set check refresh interval
    pub fn check_flush_interval(mut self, interval: Duration) -> Self {
        self.config.check.flush_interval = interval;
        self
    }

    /// Set check expiration
    pub fn check_expiration(mut self, expiration: Duration) -> Self {
        self.config.check.expiration = expiration;
        self
    }

    /// Set report cache capacity
    pub fn report_entries(mut self, num_entries: i64) -> Self {
        self.config.report.num_entries = num_entries;
        self
    }

    /// Set report flush interval
    pub fn report_flush_interval(mut self, interval: Duration) -> Self {
        self.config.report.flush_interval = interval;
        self
    }

    /// Register the merge semantics of one metric
    pub fn metric_kind<S: Into<String>>(mut self, metric_name: S, kind: MetricKind) -> Self {
        self.config.kinds.insert(metric_name, kind);
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> Result<Config> {
        self.config.check = self.config.check.normalized();
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.check.expiration > config.check.flush_interval);
    }

    #[test]
    fn test_expiration_is_raised_past_flush_interval() {
        let options =
            CheckOptions::new(10, Duration::from_millis(500), Duration::from_millis(200)).unwrap();
        assert_eq!(options.expiration, Duration::from_millis(501));

        let equal =
            CheckOptions::new(10, Duration::from_millis(500), Duration::from_millis(500)).unwrap();
        assert_eq!(equal.expiration, Duration::from_millis(501));

        let longer =
            CheckOptions::new(10, Duration::from_millis(500), Duration::from_secs(2)).unwrap();
        assert_eq!(longer.expiration, Duration::from_secs(2));
    }

    #[test]
    fn test_cache_options_apply_floor_even_when_unnormalized() {
        let raw = CheckOptions {
            num_entries: 5,
            flush_interval: Duration::from_secs(1),
            expiration: Duration::from_millis(10),
        };
        assert_eq!(
            raw.cache_options().eviction,
            Eviction::Ttl(Duration::from_millis(1001))
        );
    }

    #[test]
    fn test_non_positive_entries_disable_but_do_not_fail() {
        let check =
            CheckOptions::new(0, Duration::from_millis(500), Duration::from_secs(1)).unwrap();
        assert!(!check.is_enabled());
        let report = ReportOptions::new(-3, Duration::from_secs(1)).unwrap();
        assert!(!report.is_enabled());
        assert_eq!(report.cache_options().capacity(), None);
    }

    #[test]
    fn test_zero_flush_interval_is_rejected() {
        assert!(CheckOptions::new(10, Duration::ZERO, Duration::from_secs(1)).is_err());
        assert!(ReportOptions::new(10, Duration::ZERO).is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .service_name("library.example.com")
            .check_entries(50)
            .check_flush_interval(Duration::from_secs(2))
            .check_expiration(Duration::from_secs(1))
            .report_entries(75)
            .metric_kind("library.googleapis.com/borrowed", MetricKind::Gauge)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.service_name, "library.example.com");
        assert_eq!(config.check.num_entries, 50);
        assert_eq!(config.check.expiration, Duration::from_millis(2001));
        assert_eq!(config.report.num_entries, 75);
        assert_eq!(
            config.kinds.kind_of("library.googleapis.com/borrowed"),
            MetricKind::Gauge
        );
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
service_name: shelves.example.com
check:
  num_entries: 1000
  flush_interval: 250ms
  expiration: 5s
report:
  num_entries: 0
  flush_interval: 2s
kinds:
  serviceruntime.googleapis.com/api/consumer/quota_used_count: delta
  serviceruntime.googleapis.com/api/producer/backend_latencies: cumulative
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.service_name, "shelves.example.com");
        assert_eq!(config.check.num_entries, 1000);
        assert_eq!(config.check.flush_interval, Duration::from_millis(250));
        assert_eq!(config.check.expiration, Duration::from_secs(5));
        assert!(!config.report.is_enabled());
        assert_eq!(config.report.flush_interval, Duration::from_secs(2));
        assert_eq!(
            config
                .kinds
                .kind_of("serviceruntime.googleapis.com/api/producer/backend_latencies"),
            MetricKind::Cumulative
        );
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_yaml_with_bad_types_is_a_config_error() {
        let err = ConfigBuilder::new()
            .from_yaml("check:\n  num_entries: lots\n")
            .err()
            .unwrap();
        assert_eq!(err.category(), "config");
    }
}
