//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::LogLevel;
use std::path::PathBuf;

/// logpipe - fragmented UDP log transport and channel dispatch
#[derive(Parser, Debug)]
#[command(
    name = "logpipe",
    author,
    version,
    about = "Fragmented UDP log transport with channel dispatch",
    long_about = "Sends structured log records over UDP as fragmented datagrams and \n\
                  receives them back, reassembling each record and dispatching it \n\
                  through the handler tree of a configured channel."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "LOGPIPE_VERBOSE")]
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
        env = "LOGPIPE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive log records and dispatch them through a channel
    Listen(ListenArgs),

    /// Send one log record (or critical error)
    Send(SendArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `listen` command
#[derive(Parser, Debug, Clone)]
pub struct ListenArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "LOGPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Channel every received record is dispatched to
    #[arg(long, default_value = "main", env = "LOGPIPE_CHANNEL")]
    pub channel: String,

    /// Override the bind host from configuration
    #[arg(long, env = "LOGPIPE_BIND_HOST")]
    pub bind_host: Option<String>,

    /// Stop after this many records (0 = unlimited)
    #[arg(long, default_value = "0", env = "LOGPIPE_MAX_EVENTS")]
    pub max_events: u64,

    /// Stop after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "LOGPIPE_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "LOGPIPE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `send` command
#[derive(Parser, Debug, Clone)]
pub struct SendArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "LOGPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the destination host from configuration
    #[arg(long, env = "LOGPIPE_DESTINATION")]
    pub destination: Option<String>,

    /// Monitor id the record is attributed to
    #[arg(short, long, default_value = "logpipe")]
    pub monitor: String,

    /// Record level
    #[arg(short, long, default_value = "info")]
    pub level: LogLevel,

    /// Send on the critical-error channel instead
    #[arg(long)]
    pub critical: bool,

    /// Send the record this many times
    #[arg(long, default_value = "1")]
    pub repeat: u32,

    /// Message text
    pub message: String,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "logpipe.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "logpipe.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
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
