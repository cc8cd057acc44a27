//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shardbatch - sharded batching dispatcher
#[derive(Parser, Debug)]
#[command(
    name = "shardbatch",
    author,
    version,
    about = "Sharded batching dispatcher",
    long_about = "Routes requests to per-partition batching shards, flushes batches \n\
                  downstream under a shared worker limit, and shuts all shards down \n\
                  in parallel.\n\n\
                  The `run` command drives the dispatcher with synthetic multi-tenant load."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SHARDBATCH_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SHARDBATCH_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the dispatcher with synthetic load
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "SHARDBATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override max_workers from configuration (0 = unbounded)
    #[arg(long, env = "SHARDBATCH_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Number of distinct tenants the load is spread across
    #[arg(long, default_value = "4", env = "SHARDBATCH_TENANTS")]
    pub tenants: usize,

    /// Total number of requests to submit
    #[arg(long, default_value = "1000", env = "SHARDBATCH_REQUESTS")]
    pub requests: u64,

    /// Records carried by each request
    #[arg(long, default_value = "4")]
    pub records_per_request: usize,

    /// Payload size of each record in bytes
    #[arg(long, default_value = "64")]
    pub record_bytes: usize,

    /// Number of concurrent producers
    #[arg(long, default_value = "8")]
    pub producers: usize,

    /// Simulated downstream latency per batch in milliseconds
    #[arg(long, default_value = "5")]
    pub send_latency_ms: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SHARDBATCH_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "shardbatch.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format of the effective configuration
    #[arg(long, value_enum, default_value = "text")]
    pub format: InfoFormat,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

/// Output format of the `info` command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InfoFormat {
    #[default]
    Text,
    Toml,
    Json,
}
