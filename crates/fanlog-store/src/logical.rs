// ABOUTME: Append-only log of LogRecords over a partitioned TableStore, addressed by gapless logical positions.
// ABOUTME: Positions are claimed with conditional inserts so concurrent appenders never share a position.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fanlog_core::{CodecLimits, LogRecord, codec};
use thiserror::Error;

use crate::table::{StoreError, TableStore};

/// Errors surfaced by the logical log and the error log built on it.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("no log entry at position {0}")]
    NotFound(u64),

    #[error("invalid log entry id: {0}")]
    InvalidId(String),

    #[error("gave up claiming a log position after {0} conflicting attempts")]
    Contention(usize),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A decoded entry together with its logical position.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub position: u64,
    pub record: LogRecord,
}

/// Tuning for a [`LogicalLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Entries per table partition.
    pub partition_size: u64,
    /// Conditional inserts tried by one `append` before giving up.
    pub max_append_attempts: usize,
    pub limits: CodecLimits,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            partition_size: 1000,
            max_append_attempts: 64,
            limits: CodecLimits::default(),
        }
    }
}

/// Partition key of the partition holding `position`. Zero-padded so that
/// lexical order matches numeric order.
pub fn partition_key(position: u64, partition_size: u64) -> String {
    format!("{:010}", position / partition_size.max(1))
}

/// Row key of `position`. Ascending row keys are ascending positions.
pub fn row_key(position: u64) -> String {
    format!("{:010}", position)
}

/// An append-only sequence of records, logically contiguous from position 0
/// and physically spread over fixed-size table partitions.
///
/// The table is the source of truth for which positions are taken. The
/// in-process `next_hint` only saves a `count()` round trip on the common
/// path; a stale hint is corrected by the conflict retry loop.
pub struct LogicalLog {
    store: Arc<dyn TableStore>,
    options: LogOptions,
    next_hint: AtomicU64,
}

impl LogicalLog {
    pub fn new(store: Arc<dyn TableStore>, options: LogOptions) -> Self {
        let options = LogOptions {
            partition_size: options.partition_size.max(1),
            max_append_attempts: options.max_append_attempts.max(1),
            ..options
        };
        Self {
            store,
            options,
            next_hint: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    fn keys(&self, position: u64) -> (String, String) {
        (
            partition_key(position, self.options.partition_size),
            row_key(position),
        )
    }

    /// Encode and durably append `record`, returning its position.
    pub async fn append(&self, record: &LogRecord) -> Result<u64, LogError> {
        let properties = codec::encode(record, &self.options.limits);

        let mut candidate = self.next_hint.load(Ordering::Acquire);
        if candidate == 0 {
            candidate = self.count().await?;
        }

        for attempt in 1..=self.options.max_append_attempts {
            let (pk, rk) = self.keys(candidate);
            match self.store.put_if_absent(&pk, &rk, properties.clone()).await {
                Ok(()) => {
                    self.next_hint.fetch_max(candidate + 1, Ordering::AcqRel);
                    return Ok(candidate);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(
                        "position {} already taken (attempt {}), rescanning tail",
                        candidate,
                        attempt
                    );
                    candidate = (candidate + 1).max(self.count().await?);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            "append of {} record gave up after {} attempts",
            record.kind,
            self.options.max_append_attempts
        );
        Err(LogError::Contention(self.options.max_append_attempts))
    }

    /// Fetch the entry at `position`. Undecodable entries come back as
    /// corrupted-entry placeholders rather than errors.
    pub async fn get(&self, position: u64) -> Result<LogEntry, LogError> {
        let (pk, rk) = self.keys(position);
        match self.store.get(&pk, &rk).await {
            Ok(properties) => Ok(LogEntry {
                position,
                record: codec::decode(&properties),
            }),
            Err(StoreError::NotFound { .. }) => Err(LogError::NotFound(position)),
            Err(e) => Err(e.into()),
        }
    }

    /// Entries at `[offset, offset + limit)` in ascending order. Stops early
    /// at the tail of the log.
    pub async fn get_range(&self, offset: u64, limit: u64) -> Result<Vec<LogEntry>, LogError> {
        let size = self.options.partition_size;
        let end = offset.saturating_add(limit);
        let mut entries = Vec::new();
        let mut position = offset;

        while position < end {
            let partition_end = (position / size + 1).saturating_mul(size);
            let wanted = end.min(partition_end) - position;
            let (pk, rk) = self.keys(position);

            let rows = self
                .store
                .query_range(&pk, &rk, usize::try_from(wanted).unwrap_or(usize::MAX))
                .await?;
            let fetched = rows.len() as u64;

            for (i, row) in rows.into_iter().enumerate() {
                let expected = position + i as u64;
                let entry_position = row.row_key.parse::<u64>().unwrap_or(expected);
                entries.push(LogEntry {
                    position: entry_position,
                    record: codec::decode(&row.properties),
                });
            }

            if fetched < wanted {
                break;
            }
            position += fetched;
        }

        Ok(entries)
    }

    /// Number of appended entries. Probes partition heads with exponential
    /// then binary search, then counts the rows of the last partition.
    pub async fn count(&self) -> Result<u64, LogError> {
        if !self.partition_started(0).await? {
            return Ok(0);
        }

        // `low` is known to be started; find an unstarted `high` above it
        let mut low = 0u64;
        let mut high = 1u64;
        while self.partition_started(high).await? {
            low = high;
            high = high.saturating_mul(2);
        }
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            if self.partition_started(mid).await? {
                low = mid;
            } else {
                high = mid;
            }
        }

        let size = self.options.partition_size;
        let first = low * size;
        let (pk, rk) = self.keys(first);
        let rows = self
            .store
            .query_range(&pk, &rk, usize::try_from(size).unwrap_or(usize::MAX))
            .await?;
        let total = first + rows.len() as u64;

        self.next_hint.fetch_max(total, Ordering::AcqRel);
        Ok(total)
    }

    async fn partition_started(&self, partition: u64) -> Result<bool, LogError> {
        let first = partition.saturating_mul(self.options.partition_size);
        let (pk, rk) = self.keys(first);
        match self.store.get(&pk, &rk).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
