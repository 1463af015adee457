//! Command-line interface for Tally.
//!
//! `tally --input calls.json` replays a recorded call log through a Check
//! and a Report aggregator and prints, as JSON, everything that would have
//! been sent to the control service.

pub mod replay;

use crate::core::{Config, ConfigBuilder, LoggingConfig, Result, TallyError};
use clap::Parser;
use std::path::PathBuf;

/// Replay API call logs through the Tally aggregation engine
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/tally/config.yaml)
    #[arg(short, long, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON call log to replay
    #[arg(short, long, env = "TALLY_INPUT")]
    pub input: Option<PathBuf>,

    /// Override the managed service name
    #[arg(long, env = "TALLY_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "TALLY_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Resolve the configuration for this run.
    ///
    /// An explicit `--config` file must exist; the default location is used
    /// only when present. `--service-name` and `--debug` are applied on top
    /// of whatever the file set.
    pub async fn load_config(&self) -> Result<Config> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join("tally").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        let mut builder = ConfigBuilder::new();
        if let Some(path) = path {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                TallyError::config(format!("Failed to read config file {:?}: {}", path, e))
            })?;
            builder = builder.from_yaml(&content)?;
        }
        if let Some(name) = &self.service_name {
            builder = builder.service_name(name.as_str());
        }
        builder.debug(self.debug).build()
    }

    /// Initialize logging from the loaded config. Output goes to stderr so
    /// stdout stays JSON.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = log_level(self.debug, std::env::var("TALLY_LOG_LEVEL").ok(), logging);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let json_layer = logging.structured.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .json()
        });
        let text_layer = (!logging.structured).then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(self.debug)
                .compact()
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(text_layer)
            .try_init()
            .map_err(|e| TallyError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// `--debug` wins, then `TALLY_LOG_LEVEL`, then the config file.
fn log_level(debug: bool, env_level: Option<String>, logging: &LoggingConfig) -> String {
    if debug {
        return "debug".to_string();
    }
    env_level.unwrap_or_else(|| logging.level.as_str().to_string())
}

/// Execute the Tally command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config.logging)?;
    tracing::debug!(service = %config.service_name, "configuration loaded");

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Service: {}", config.service_name);
        println!(
            "  Check cache: {} entries, refresh {:?}, expire {:?}",
            config.check.num_entries, config.check.flush_interval, config.check.expiration
        );
        println!(
            "  Report cache: {} entries, flush {:?}",
            config.report.num_entries, config.report.flush_interval
        );
        println!("  Metric kinds: {}", config.kinds.len());
        return Ok(());
    }

    let input = cli
        .input
        .as_ref()
        .ok_or_else(|| TallyError::config("--input is required unless --check-config is given"))?;
    let content = tokio::fs::read_to_string(input).await?;
    let records = replay::parse_records(&content)?;

    let summary = replay::replay(&config, records)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
