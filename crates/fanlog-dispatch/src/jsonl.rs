// ABOUTME: Append-only JSONL file destination, one serialized LogRecord per line.
// ABOUTME: Each submit appends and fsyncs on the blocking pool; replay reads records back in order.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fanlog_core::LogRecord;

use crate::writer::{RecordWriter, WriteError};

/// A destination that appends each record as one JSON line to a file.
pub struct JsonlWriter {
    name: String,
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonlWriter {
    /// Open (or create) a JSONL file at the given path in append mode.
    /// Creates parent directories if they do not exist.
    pub fn open(name: &str, path: &Path) -> Result<Self, WriteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            name: name.to_owned(),
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record from a JSONL file, in order. Empty lines are skipped.
    pub fn replay(path: &Path) -> Result<Vec<LogRecord>, WriteError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordWriter for JsonlWriter {
    async fn submit(&self, record: &LogRecord) -> Result<(), WriteError> {
        let json = serde_json::to_string(record)?;
        let file = Arc::clone(&self.file);

        tokio::task::spawn_blocking(move || -> Result<(), WriteError> {
            let mut file = file
                .lock()
                .map_err(|_| WriteError::Backend("jsonl file lock poisoned".to_string()))?;
            writeln!(file, "{}", json)?;
            file.sync_all()?;
            Ok(())
        })
        .await
        .map_err(|e| WriteError::Panicked(e.to_string()))?
    }

    fn name(&self) -> &str {
        &self.name
    }
}
