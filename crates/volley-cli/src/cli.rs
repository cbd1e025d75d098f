//! Command-line arguments
//!
//! Run settings are optional here so a `--profile` file can supply them;
//! explicit flags always win over the profile.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "volley")]
#[command(version)]
#[command(about = "Concurrent load generator with periodic latency statistics", long_about = None)]
pub struct Cli {
    /// Registered operation to run (e.g. `http`, `sleep`)
    #[arg(long)]
    pub name: Option<String>,

    /// Total operations across all lanes [default: 200]
    #[arg(short = 'n', long)]
    pub requests: Option<usize>,

    /// Concurrent lanes [default: 50]
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per-lane rate limit in calls per second, 0 for unthrottled [default: 0]
    #[arg(short = 'q', long)]
    pub rate: Option<f64>,

    /// Report interval in milliseconds [default: 1000]
    #[arg(short = 'i', long = "interval-ms")]
    pub interval_ms: Option<u64>,

    /// Run for this many seconds instead of a fixed request count
    #[arg(short = 'z', long = "duration-secs")]
    pub duration_secs: Option<u64>,

    /// JSON file holding the operation's config map
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TOML run profile
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Directory for the results file [default: .]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Results file format [default: csv]
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Runtime worker threads [default: number of CPUs]
    #[arg(long, env = "VOLLEY_THREADS")]
    pub threads: Option<usize>,

    /// List registered operations and exit
    #[arg(long)]
    pub list: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
}
