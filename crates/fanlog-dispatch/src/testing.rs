// ABOUTME: Test utilities for fanlog-dispatch: a scriptable stub destination and an in-memory timing sink.
// ABOUTME: Used in tests to simulate slow, failing, or panicking destinations without real backends.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fanlog_core::LogRecord;

use crate::timing::{SinkError, TimingRecord, TimingSink};
use crate::writer::{RecordWriter, WriteError};

/// A destination that records what it was sent, optionally after a delay,
/// and can be told to fail or panic.
#[derive(Debug)]
pub struct StubWriter {
    name: String,
    delay: Duration,
    failure: Option<String>,
    panics: bool,
    submitted: Mutex<Vec<LogRecord>>,
}

impl StubWriter {
    /// A stub that accepts every record immediately.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            delay: Duration::ZERO,
            failure: None,
            panics: false,
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` before settling.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every submission with a backend error carrying `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_owned());
        self
    }

    /// Panic inside `submit`.
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Records received so far, including ones that were then failed.
    pub fn submissions(&self) -> Vec<LogRecord> {
        self.submitted
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordWriter for StubWriter {
    async fn submit(&self, record: &LogRecord) -> Result<(), WriteError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics {
            panic!("stub destination {} panicked", self.name);
        }
        if let Ok(mut records) = self.submitted.lock() {
            records.push(record.clone());
        }
        match &self.failure {
            Some(message) => Err(WriteError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A timing sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryTimingSink {
    records: Mutex<Vec<TimingRecord>>,
}

impl MemoryTimingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TimingRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimingSink for MemoryTimingSink {
    async fn write(&self, timing: &TimingRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(timing.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> LogRecord {
        LogRecord::new("K".to_string(), "tests".to_string(), "m".to_string())
    }

    #[tokio::test]
    async fn stub_records_submissions() {
        let stub = StubWriter::new("table");
        stub.submit(&record()).await.unwrap();

        assert_eq!(stub.name(), "table");
        assert_eq!(stub.submissions().len(), 1);
    }

    #[tokio::test]
    async fn failing_stub_still_records_then_errors() {
        let stub = StubWriter::new("table").failing("offline");
        let err = stub.submit(&record()).await.unwrap_err();

        assert!(err.to_string().contains("offline"));
        assert_eq!(stub.submissions().len(), 1);
    }

    #[tokio::test]
    async fn memory_sink_keeps_records_in_order() {
        let sink = MemoryTimingSink::new();
        sink.write(&TimingRecord::new(Utc::now(), "a".to_string()))
            .await
            .unwrap();
        sink.write(&TimingRecord::new(Utc::now(), "b".to_string()))
            .await
            .unwrap();

        let kinds: Vec<_> = sink.records().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec!["a", "b"]);
    }
}
