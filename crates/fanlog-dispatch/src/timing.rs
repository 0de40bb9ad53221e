// ABOUTME: TimingRecord captured for every dispatched write, and the append-only sinks that persist it.
// ABOUTME: The CSV sink writes one line per write: start,kind,primary,secondary,total.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors that can occur while persisting timing lines.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timing sink lock poisoned")]
    Poisoned,

    #[error("timing write task failed: {0}")]
    Task(String),
}

/// Wall-clock timing of one dispatched write. A slot whose destination is
/// not configured stays at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub start: DateTime<Utc>,
    pub kind: String,
    pub primary: Duration,
    pub secondary: Duration,
    pub total: Duration,
}

impl TimingRecord {
    pub fn new(start: DateTime<Utc>, kind: String) -> Self {
        Self {
            start,
            kind,
            primary: Duration::ZERO,
            secondary: Duration::ZERO,
            total: Duration::ZERO,
        }
    }

    /// The CSV line for this record, without a trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.start.to_rfc3339_opts(SecondsFormat::Micros, true),
            csv_field(&self.kind),
            format_duration(self.primary),
            format_duration(self.secondary),
            format_duration(self.total),
        )
    }
}

/// Seconds with 100ns resolution, e.g. `0.0012500`.
pub fn format_duration(d: Duration) -> String {
    format!("{}.{:07}", d.as_secs(), d.subsec_nanos() / 100)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write-only destination for timing records.
#[async_trait]
pub trait TimingSink: Send + Sync {
    async fn write(&self, timing: &TimingRecord) -> Result<(), SinkError>;
}

/// Appends timing lines to a CSV file.
pub struct CsvTimingSink {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl CsvTimingSink {
    /// Open (or create) the CSV file in append mode, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TimingSink for CsvTimingSink {
    async fn write(&self, timing: &TimingRecord) -> Result<(), SinkError> {
        let line = timing.to_line();
        let file = Arc::clone(&self.file);

        tokio::task::spawn_blocking(move || -> Result<(), SinkError> {
            let mut file = file.lock().map_err(|_| SinkError::Poisoned)?;
            writeln!(file, "{}", line)?;
            file.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Task(e.to_string()))?
    }
}
