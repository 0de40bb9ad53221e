// ABOUTME: Adapts the error log into a dispatch destination so the logical log can be a fan-out branch.

use std::sync::Arc;

use async_trait::async_trait;
use fanlog_core::LogRecord;
use fanlog_store::ErrorLog;

use crate::writer::{RecordWriter, WriteError};

pub struct ErrorLogWriter {
    name: String,
    log: Arc<ErrorLog>,
}

impl ErrorLogWriter {
    pub fn new(name: &str, log: Arc<ErrorLog>) -> Self {
        Self {
            name: name.to_owned(),
            log,
        }
    }
}

#[async_trait]
impl RecordWriter for ErrorLogWriter {
    async fn submit(&self, record: &LogRecord) -> Result<(), WriteError> {
        self.log.log(record).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanlog_store::{LogOptions, MemoryTable};

    #[tokio::test]
    async fn submit_appends_to_the_log() {
        let log = Arc::new(ErrorLog::new(
            Arc::new(MemoryTable::new()),
            LogOptions::default(),
        ));
        let writer = ErrorLogWriter::new("table", Arc::clone(&log));

        let record = LogRecord::new("K".to_string(), "tests".to_string(), "hello".to_string());
        writer.submit(&record).await.unwrap();
        writer.submit(&record).await.unwrap();

        assert_eq!(log.count().await.unwrap(), 2);
        assert_eq!(log.get_error("1").await.unwrap().record.message, "hello");
    }
}
