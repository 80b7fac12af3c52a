use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_TIME_LIMIT_SECS, JSON_LOG_FILE, PLAIN_LOG_FILE};

/// Log record format options
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl OutputFormat {
    /// Log file used when no `--output` path is given.
    pub fn default_log_file(self) -> &'static str {
        match self {
            OutputFormat::Plain => PLAIN_LOG_FILE,
            OutputFormat::Json => JSON_LOG_FILE,
        }
    }
}

/// CLI arguments structure
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target URLs.
    pub urls: Vec<String>,

    /// Also read target URLs from stdin, one per line.
    #[arg(short = 'i', long)]
    pub stdin: bool,

    // NETWORK
    /// Send the whole batch again every N seconds (0 sends it once).
    #[arg(short, long, default_value_t = 0, help_heading = "NETWORK")]
    pub rate: u64,

    /// Overall time limit of the run in seconds.
    #[arg(
        short,
        long,
        visible_alias = "rate-limit",
        default_value_t = DEFAULT_TIME_LIMIT_SECS,
        help_heading = "NETWORK"
    )]
    pub time_limit: u64,

    // HTTP
    /// HTTP method.
    #[arg(short, long, default_value = "GET", help_heading = "HTTP")]
    pub method: String,

    /// Request body, sent as JSON.
    #[arg(short, long, help_heading = "HTTP")]
    pub data: Option<String>,

    // OUTPUT
    /// Show the response body.
    #[arg(short, long, help_heading = "OUTPUT")]
    pub body: bool,

    /// Keep only the first N elements of a JSON array body (0 for unlimited).
    #[arg(short, long, default_value_t = 0, help_heading = "OUTPUT")]
    pub limit: usize,

    /// Append results to a log file.
    #[arg(short, long, help_heading = "OUTPUT")]
    pub file: bool,

    /// Log file path (defaults to requests.txt or requests.json).
    #[arg(short, long, help_heading = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Log record format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain, help_heading = "OUTPUT")]
    pub format: OutputFormat,

    /// Disable color output.
    #[arg(long, help_heading = "OUTPUT")]
    pub no_color: bool,
}

/// Immutable settings of one run, shared by every component.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub method: String,
    pub show_body: bool,
    /// Decoded element cap for array bodies, 0 means unlimited.
    pub body_limit: usize,
    /// Interval between passes, zero runs a single pass.
    pub rate: Duration,
    pub time_limit: Duration,
    pub write_output: bool,
    pub request_body: Option<String>,
    pub format: OutputFormat,
    pub log_path: PathBuf,
    pub colored: bool,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let method = cli.method.trim().to_uppercase();
        if method.is_empty() {
            bail!("--method must not be empty");
        }
        if cli.time_limit == 0 {
            bail!("--time-limit must be greater than 0");
        }

        let log_path = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(cli.format.default_log_file()));

        Ok(Self {
            method,
            show_body: cli.body,
            body_limit: cli.limit,
            rate: Duration::from_secs(cli.rate),
            time_limit: Duration::from_secs(cli.time_limit),
            write_output: cli.file,
            request_body: cli.data.clone().filter(|d| !d.is_empty()),
            format: cli.format,
            log_path,
            colored: !cli.no_color,
        })
    }

    pub fn is_repeating(&self) -> bool {
        !self.rate.is_zero()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            show_body: false,
            body_limit: 0,
            rate: Duration::ZERO,
            time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
            write_output: false,
            request_body: None,
            format: OutputFormat::Plain,
            log_path: PathBuf::from(PLAIN_LOG_FILE),
            colored: false,
        }
    }
}
