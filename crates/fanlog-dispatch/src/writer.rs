// ABOUTME: Defines the RecordWriter trait every dispatch destination implements, plus WriteError.
// ABOUTME: Destinations carry an explicit role tag that decides which timing slot they fill.

use std::sync::Arc;

use async_trait::async_trait;
use fanlog_core::LogRecord;
use fanlog_store::LogError;

/// Errors a destination can report for one submitted record.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("destination task panicked: {0}")]
    Panicked(String),
}

/// A backing service that durably accepts one record per call.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Persist `record`. Returns once the destination has accepted it.
    async fn submit(&self, record: &LogRecord) -> Result<(), WriteError>;

    /// Destination name for logging and error reports.
    fn name(&self) -> &str;
}

/// Which timing slot a destination fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterRole {
    Primary,
    Secondary,
    /// Receives every write but is not individually timed.
    Other,
}

/// A configured destination: a writer and its role tag.
#[derive(Clone)]
pub struct Destination {
    pub role: WriterRole,
    pub writer: Arc<dyn RecordWriter>,
}

impl Destination {
    pub fn new(role: WriterRole, writer: Arc<dyn RecordWriter>) -> Self {
        Self { role, writer }
    }

    pub fn primary(writer: Arc<dyn RecordWriter>) -> Self {
        Self::new(WriterRole::Primary, writer)
    }

    pub fn secondary(writer: Arc<dyn RecordWriter>) -> Self {
        Self::new(WriterRole::Secondary, writer)
    }

    pub fn other(writer: Arc<dyn RecordWriter>) -> Self {
        Self::new(WriterRole::Other, writer)
    }
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("role", &self.role)
            .field("writer", &self.writer.name())
            .finish()
    }
}
