// ABOUTME: Error log facade over the logical log: string ids, point lookup, and newest-first paging.
// ABOUTME: Converts "page N from the end" into an ascending tail window and reverses it in memory.

use std::sync::Arc;

use fanlog_core::LogRecord;

use crate::logical::{LogEntry, LogError, LogOptions, LogicalLog};
use crate::table::TableStore;

/// One page of entries, newest first, with the total entry count at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub entries: Vec<LogEntry>,
    pub total: u64,
}

/// An entry addressed by its string id (the decimal logical position).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLogEntry {
    pub id: String,
    pub record: LogRecord,
}

impl From<LogEntry> for ErrorLogEntry {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.position.to_string(),
            record: entry.record,
        }
    }
}

/// Ascending `(offset, len)` window holding page `page_index` counted from
/// the newest entry, or None when the page lies entirely before position 0.
pub fn page_window(total: u64, page_index: u64, page_size: u64) -> Option<(u64, u64)> {
    let total = i128::from(total);
    let mut size = i128::from(page_size);
    let mut offset = total - (i128::from(page_index) + 1).saturating_mul(size);

    if offset < 0 {
        size += offset;
        offset = 0;
    }
    if size <= 0 {
        return None;
    }

    Some((offset as u64, size as u64))
}

/// The error log: append records, fetch one by id, or page through them
/// newest first.
pub struct ErrorLog {
    log: LogicalLog,
}

impl ErrorLog {
    pub fn new(store: Arc<dyn TableStore>, options: LogOptions) -> Self {
        Self {
            log: LogicalLog::new(store, options),
        }
    }

    pub fn logical(&self) -> &LogicalLog {
        &self.log
    }

    /// Append a record and return its id.
    pub async fn log(&self, record: &LogRecord) -> Result<String, LogError> {
        let position = self.log.append(record).await?;
        tracing::debug!("logged {} record at position {}", record.kind, position);
        Ok(position.to_string())
    }

    /// Fetch a record by id.
    pub async fn get_error(&self, id: &str) -> Result<ErrorLogEntry, LogError> {
        let position: u64 = id
            .trim()
            .parse()
            .map_err(|_| LogError::InvalidId(id.to_string()))?;
        Ok(self.log.get(position).await?.into())
    }

    /// Page `page_index` (0 = newest) of `page_size` entries, newest first.
    pub async fn get_page(&self, page_index: u64, page_size: u64) -> Result<Page, LogError> {
        let total = self.log.count().await?;

        let Some((offset, len)) = page_window(total, page_index, page_size) else {
            return Ok(Page {
                entries: Vec::new(),
                total,
            });
        };

        let mut entries = self.log.get_range(offset, len).await?;
        entries.reverse();
        Ok(Page { entries, total })
    }

    /// Same as [`get_page`](Self::get_page) with string ids.
    pub async fn get_errors(
        &self,
        page_index: u64,
        page_size: u64,
    ) -> Result<(Vec<ErrorLogEntry>, u64), LogError> {
        let page = self.get_page(page_index, page_size).await?;
        let entries = page.entries.into_iter().map(ErrorLogEntry::from).collect();
        Ok((entries, page.total))
    }

    pub async fn count(&self) -> Result<u64, LogError> {
        self.log.count().await
    }
}

/// Record a handled error in `log`. Logging must never take the caller down,
/// so any failure is reported through tracing and dropped.
pub async fn quiet_log(log: &ErrorLog, application: &str, err: &(dyn std::error::Error + 'static)) {
    let record = LogRecord::from_error(application, err);
    if let Err(e) = log.log(&record).await {
        tracing::warn!("failed to log handled error '{}': {}", err, e);
    }
}
