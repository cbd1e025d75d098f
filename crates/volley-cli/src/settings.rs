//! Run profile loading and flag resolution

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use volley_core::{CsvSink, Finalize, JsonLinesSink, OperationConfig, Sink, SinkError, WorkerConfig};

use crate::cli::{Cli, OutputFormat};

/// Optional TOML file providing the same settings as the flags
///
/// ```toml
/// name = "http"
/// requests = 10000
/// concurrency = 32
/// interval_ms = 500
///
/// [operation_config]
/// url = "http://localhost:8080/health"
/// timeout = 5
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub name: Option<String>,
    pub requests: Option<usize>,
    pub concurrency: Option<usize>,
    pub rate: Option<f64>,
    pub interval_ms: Option<u64>,
    pub duration_secs: Option<u64>,

    /// JSON file holding the operation config; wins over `operation_config`
    pub config: Option<PathBuf>,

    /// Inline operation config
    pub operation_config: Option<OperationConfig>,

    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse profile {}", path.display()))
    }
}

/// Fully resolved run settings
#[derive(Debug)]
pub struct Settings {
    pub worker: WorkerConfig,
    pub output: PathBuf,
    pub format: OutputFormat,
}

impl Settings {
    /// Merge flags over the profile over the defaults
    pub fn resolve(cli: &Cli, profile: Profile) -> Result<Self> {
        let defaults = WorkerConfig::default();

        let operation_config = match cli.config.as_ref().or(profile.config.as_ref()) {
            Some(path) => load_operation_config(path)?,
            None => profile.operation_config.unwrap_or_default(),
        };

        let worker = WorkerConfig {
            total: cli.requests.or(profile.requests).unwrap_or(defaults.total),
            concurrency: cli
                .concurrency
                .or(profile.concurrency)
                .unwrap_or(defaults.concurrency),
            rate: cli.rate.or(profile.rate).unwrap_or(defaults.rate),
            interval: cli
                .interval_ms
                .or(profile.interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            // 0 means no duration limit
            duration: cli
                .duration_secs
                .or(profile.duration_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            operation: cli.name.clone().or(profile.name).unwrap_or_default(),
            operation_config,
            ..defaults
        };

        Ok(Self {
            worker,
            output: cli
                .output
                .clone()
                .or(profile.output)
                .unwrap_or_else(|| PathBuf::from(".")),
            format: cli.format.or(profile.format).unwrap_or_default(),
        })
    }

    /// Sink for the selected format
    ///
    /// Nothing touches the filesystem until the first record arrives, so a
    /// run rejected at build time leaves no results file behind.
    pub fn sink(&self) -> Box<dyn Sink> {
        match self.format {
            OutputFormat::Csv => Box::new(CsvSink::new(&self.output)),
            OutputFormat::Jsonl => Box::new(JsonLinesFile::new(&self.output)),
        }
    }
}

/// JSON lines sink that creates `output_<timestamp>.jsonl` on first use
struct JsonLinesFile {
    dir: PathBuf,
    inner: Option<JsonLinesSink<File>>,
}

impl JsonLinesFile {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            inner: None,
        }
    }

    fn open(&mut self) -> std::result::Result<&mut JsonLinesSink<File>, SinkError> {
        let sink = match self.inner.take() {
            Some(sink) => sink,
            None => {
                std::fs::create_dir_all(&self.dir)?;
                let path = self.dir.join(format!(
                    "output_{}.jsonl",
                    Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
                ));
                debug!("Writing results to {}", path.display());
                JsonLinesSink::create(&path)?
            }
        };
        Ok(self.inner.insert(sink))
    }
}

impl Sink for JsonLinesFile {
    fn write(&mut self, record: &Finalize) -> std::result::Result<(), SinkError> {
        self.open()?.write(record)
    }

    fn save(&mut self) -> std::result::Result<(), SinkError> {
        self.open()?.save()
    }
}

fn load_operation_config(path: &Path) -> Result<OperationConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read operation config {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("operation config {} must be a JSON object", path.display()))
}
