//! Destinations for interval summaries
//!
//! The reporter hands every [`Finalize`] record to a [`Sink`] as it is
//! produced and the pool calls [`Sink::save`] exactly once at shutdown, after
//! the last record.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use crate::error::SinkError;
use crate::interim::{Finalize, PERCENTILES};

/// Receiver of interval summaries
pub trait Sink: Send {
    /// Append one interval record
    fn write(&mut self, record: &Finalize) -> Result<(), SinkError>;

    /// Persist everything written so far; called once, after the last `write`
    fn save(&mut self) -> Result<(), SinkError>;
}

// ============================================================================
// MEMORY
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Finalize>,
    saves: usize,
}

/// Sink keeping records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

/// Shared view of a [`MemorySink`] that outlives the pool owning the sink
#[derive(Debug, Clone)]
pub struct MemorySinkHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> (Self, MemorySinkHandle) {
        let sink = Self::default();
        let handle = MemorySinkHandle {
            state: sink.state.clone(),
        };
        (sink, handle)
    }
}

impl Sink for MemorySink {
    fn write(&mut self, record: &Finalize) -> Result<(), SinkError> {
        self.state.lock().records.push(record.clone());
        Ok(())
    }

    fn save(&mut self) -> Result<(), SinkError> {
        self.state.lock().saves += 1;
        Ok(())
    }
}

impl MemorySinkHandle {
    pub fn records(&self) -> Vec<Finalize> {
        self.state.lock().records.clone()
    }

    /// Number of `save` calls observed
    pub fn saves(&self) -> usize {
        self.state.lock().saves
    }

    pub fn total_success(&self) -> u64 {
        self.state.lock().records.iter().map(|r| r.success).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.state.lock().records.iter().map(|r| r.errors).sum()
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Spreadsheet-friendly sink writing `output_<timestamp>.csv` on save
///
/// Latencies are written in milliseconds.
#[derive(Debug)]
pub struct CsvSink {
    dir: PathBuf,
    rows: Vec<String>,
    saved: Option<PathBuf>,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rows: Vec::with_capacity(1024),
            saved: None,
        }
    }

    /// Title row
    pub fn header() -> String {
        let mut titles = vec![
            "timestamp".to_string(),
            "TPS".to_string(),
            "avg latency".to_string(),
            "total success".to_string(),
            "total fail".to_string(),
        ];
        titles.extend(PERCENTILES.iter().map(|p| format!("TP{p}")));
        titles.join(",")
    }

    /// Format one record as a CSV row
    pub fn format_row(record: &Finalize) -> String {
        let mut row = format!(
            "{},{:.3},{:.3},{},{}",
            record.timestamp.to_rfc3339(),
            record.throughput,
            millis(record.avg_latency),
            record.success,
            record.errors,
        );
        for value in record.percentiles.values() {
            row.push_str(&format!(",{:.3}", millis(value)));
        }
        row
    }

    /// Path written by `save`, once saved
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved.as_deref()
    }
}

impl Sink for CsvSink {
    fn write(&mut self, record: &Finalize) -> Result<(), SinkError> {
        self.rows.push(Self::format_row(record));
        Ok(())
    }

    fn save(&mut self) -> Result<(), SinkError> {
        if self.saved.is_some() {
            return Err(SinkError::AlreadySaved);
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!(
            "output_{}.csv",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", Self::header())?;
        for row in &self.rows {
            writeln!(writer, "{row}")?;
        }
        writer.flush()?;

        info!("Saved {} interval records to {}", self.rows.len(), path.display());
        self.saved = Some(path);
        Ok(())
    }
}

// ============================================================================
// JSON LINES
// ============================================================================

/// Sink streaming one JSON object per record
pub struct JsonLinesSink<W: Write + Send> {
    writer: BufWriter<W>,
    written: usize,
}

impl JsonLinesSink<File> {
    /// Create (truncating) `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn write(&mut self, record: &Finalize) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn save(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn millis(value: std::time::Duration) -> f64 {
    value.as_nanos() as f64 / 1_000_000.0
}
