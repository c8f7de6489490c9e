//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::ExportChannel;
use observability::ObservabilityConfig;
use std::path::{Path, PathBuf};

/// Edge Export - push payloads through the asynchronous export engine
#[derive(Parser, Debug)]
#[command(
    name = "edge-export",
    author,
    version,
    about = "Edge data-export engine",
    long_about = "Submits raw frames and inference metadata to the configured export \n\
                  ports, waits for their asynchronous completions and reports the \n\
                  outcome of every operation."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EDGE_EXPORT_VERBOSE")]
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
        env = "EDGE_EXPORT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Log level for the engine crates only (e.g. trace to follow dispatch and pump)
    #[arg(long, global = true, env = "EDGE_EXPORT_ENGINE_LOG")]
    pub engine_log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Logging setup for this invocation
    ///
    /// The metrics endpoint is left to `send`, which owns the session.
    pub fn observability_config(&self) -> ObservabilityConfig {
        let config = ObservabilityConfig::from_verbosity(self.verbose, self.quiet)
            .with_format(self.log_format.into());
        match &self.engine_log_level {
            Some(level) => config.with_engine_log_level(level.clone()),
            None => config,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export files through the configured ports
    Send(SendArgs),

    /// Validate configuration file without exporting
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Send(_) => "send",
            Commands::Validate(_) => "validate",
            Commands::Info(_) => "info",
        }
    }

    /// Config file the command reads
    pub fn config_path(&self) -> &Path {
        match self {
            Commands::Send(args) => &args.config,
            Commands::Validate(args) => &args.config,
            Commands::Info(args) => &args.config,
        }
    }
}

/// Arguments for the `send` command
#[derive(Parser, Debug, Clone)]
pub struct SendArgs {
    /// Files to export, one operation per file
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "export.toml",
        env = "EDGE_EXPORT_CONFIG"
    )]
    pub config: PathBuf,

    /// Channel the files are exported on
    #[arg(long, value_enum, default_value = "raw")]
    pub channel: ChannelArg,

    /// Backend transport
    #[arg(long, value_enum, default_value = "file", env = "EDGE_EXPORT_TRANSPORT")]
    pub transport: TransportArg,

    /// Output directory of the file transport
    #[arg(short, long, default_value = "./export-output", env = "EDGE_EXPORT_OUTPUT")]
    pub output: PathBuf,

    /// Send one file at a time, waiting for each completion
    #[arg(long)]
    pub serialized: bool,

    /// Export every file this many times
    #[arg(long, default_value = "1")]
    pub repeat: u32,

    /// Per-operation timeout in milliseconds (negative = wait forever)
    #[arg(long, default_value = "5000", allow_negative_numbers = true)]
    pub timeout_ms: i64,

    /// Time allowed to drain pending operations at the end, in milliseconds
    #[arg(long, default_value = "2000")]
    pub drain_ms: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "EDGE_EXPORT_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "export.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "export.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show engine tuning
    #[arg(long)]
    pub engine: bool,
}

/// Export channel
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelArg {
    /// Raw frames (input tensor port)
    Raw,
    /// Inference metadata
    Metadata,
}

impl From<ChannelArg> for ExportChannel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Raw => ExportChannel::Raw,
            ChannelArg::Metadata => ExportChannel::Metadata,
        }
    }
}

/// Backend transport
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportArg {
    /// Write objects under the output directory
    File,
    /// Only log requests, completing them immediately
    Log,
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
