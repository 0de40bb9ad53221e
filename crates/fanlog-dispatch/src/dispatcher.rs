// ABOUTME: Fan-out dispatcher that submits one record to every configured destination in parallel.
// ABOUTME: Waits for all destinations to settle, persists a timing line, then reports the first failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fanlog_core::LogRecord;
use futures::future::join_all;
use thiserror::Error;

use crate::timing::{TimingRecord, TimingSink};
use crate::writer::{Destination, WriteError, WriterRole};

/// Errors returned by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("record is missing its kind discriminator")]
    MissingRecord,

    #[error("more than one secondary destination configured: {first} and {second}")]
    DuplicateSecondary { first: String, second: String },

    #[error("destination {destination} failed: {source}")]
    Write {
        destination: String,
        #[source]
        source: WriteError,
    },
}

/// Submits each record to all destinations concurrently and times them.
///
/// Up to two destinations are timed: the primary slot goes to the first
/// `Primary` destination (or, without one, the first non-secondary one) and
/// the secondary slot to the single `Secondary` destination. All other
/// destinations still receive every record.
pub struct FanOutDispatcher {
    destinations: Vec<Destination>,
    primary: Option<usize>,
    secondary: Option<usize>,
    sink: Arc<dyn TimingSink>,
}

impl FanOutDispatcher {
    /// Resolve the timed slots once. Fails if two destinations are tagged
    /// `Secondary`.
    pub fn new(
        destinations: Vec<Destination>,
        sink: Arc<dyn TimingSink>,
    ) -> Result<Self, DispatchError> {
        let mut secondaries = destinations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.role == WriterRole::Secondary);
        let secondary = secondaries.next().map(|(i, _)| i);
        if let (Some(first), Some((_, second))) = (secondary, secondaries.next()) {
            return Err(DispatchError::DuplicateSecondary {
                first: destinations[first].writer.name().to_string(),
                second: second.writer.name().to_string(),
            });
        }

        let primary = destinations
            .iter()
            .position(|d| d.role == WriterRole::Primary)
            .or_else(|| {
                destinations
                    .iter()
                    .position(|d| d.role != WriterRole::Secondary)
            });

        Ok(Self {
            destinations,
            primary,
            secondary,
            sink,
        })
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.map(|i| self.destinations[i].writer.name())
    }

    pub fn secondary_name(&self) -> Option<&str> {
        self.secondary.map(|i| self.destinations[i].writer.name())
    }

    /// Submit `record` to every destination and wait for all of them.
    ///
    /// The timing line is written before any destination failure is
    /// returned; when several destinations fail, the error of the earliest
    /// configured one wins. Sink failures are logged and ignored.
    pub async fn submit_all(&self, record: &LogRecord) -> Result<TimingRecord, DispatchError> {
        if record.kind.trim().is_empty() {
            return Err(DispatchError::MissingRecord);
        }

        let mut timing = TimingRecord::new(Utc::now(), record.kind.clone());
        let start = Instant::now();
        let shared = Arc::new(record.clone());

        let tasks = self.destinations.iter().map(|destination| {
            let writer = Arc::clone(&destination.writer);
            let record = Arc::clone(&shared);
            tokio::spawn(async move {
                let result = writer.submit(&record).await;
                (result, start.elapsed())
            })
        });
        let outcomes = join_all(tasks).await;

        let mut first_error = None;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let (result, elapsed): (Result<(), WriteError>, Duration) = match outcome {
                Ok(settled) => settled,
                Err(e) => (Err(WriteError::Panicked(e.to_string())), start.elapsed()),
            };

            if Some(index) == self.primary {
                timing.primary = elapsed;
            } else if Some(index) == self.secondary {
                timing.secondary = elapsed;
            }

            if let Err(source) = result {
                let destination = self.destinations[index].writer.name().to_string();
                tracing::warn!(
                    "destination {} failed to accept {} record: {}",
                    destination,
                    record.kind,
                    source
                );
                if first_error.is_none() {
                    first_error = Some(DispatchError::Write {
                        destination,
                        source,
                    });
                }
            }
        }

        timing.total = start.elapsed();

        if let Err(e) = self.sink.write(&timing).await {
            tracing::warn!("failed to persist timing for {} record: {}", record.kind, e);
        }
        tracing::debug!(
            "dispatched {} record to {} destinations: primary={:?} secondary={:?} total={:?}",
            record.kind,
            self.destinations.len(),
            timing.primary,
            timing.secondary,
            timing.total
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(timing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTimingSink, StubWriter};
    use crate::timing::SinkError;
    use crate::writer::RecordWriter;

    fn record() -> LogRecord {
        LogRecord::new(
            "PackageAuditRecord".to_string(),
            "gallery".to_string(),
            "package listed".to_string(),
        )
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl TimingSink for FailingSink {
        async fn write(&self, _timing: &TimingRecord) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn resolves_roles_once() {
        let sink = Arc::new(MemoryTimingSink::new());
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::secondary(Arc::new(StubWriter::new("ifx"))),
                Destination::other(Arc::new(StubWriter::new("mirror"))),
                Destination::primary(Arc::new(StubWriter::new("table"))),
            ],
            sink,
        )
        .unwrap();

        assert_eq!(dispatcher.primary_name(), Some("table"));
        assert_eq!(dispatcher.secondary_name(), Some("ifx"));
    }

    #[test]
    fn primary_falls_back_to_first_non_secondary() {
        let sink = Arc::new(MemoryTimingSink::new());
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::secondary(Arc::new(StubWriter::new("ifx"))),
                Destination::other(Arc::new(StubWriter::new("table"))),
            ],
            sink,
        )
        .unwrap();

        assert_eq!(dispatcher.primary_name(), Some("table"));
    }

    #[test]
    fn rejects_two_secondaries() {
        let sink = Arc::new(MemoryTimingSink::new());
        let result = FanOutDispatcher::new(
            vec![
                Destination::secondary(Arc::new(StubWriter::new("a"))),
                Destination::secondary(Arc::new(StubWriter::new("b"))),
            ],
            sink,
        );

        match result {
            Err(DispatchError::DuplicateSecondary { first, second }) => {
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            _ => panic!("expected DuplicateSecondary"),
        }
    }

    #[tokio::test]
    async fn empty_kind_is_rejected_before_any_io() {
        let sink = Arc::new(MemoryTimingSink::new());
        let writer = Arc::new(StubWriter::new("table"));
        let dispatcher =
            FanOutDispatcher::new(vec![Destination::primary(writer.clone())], sink.clone())
                .unwrap();

        let mut bad = record();
        bad.kind = String::new();

        assert!(matches!(
            dispatcher.submit_all(&bad).await,
            Err(DispatchError::MissingRecord)
        ));
        assert!(writer.submissions().is_empty());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn every_destination_receives_the_record() {
        let sink = Arc::new(MemoryTimingSink::new());
        let writers: Vec<Arc<StubWriter>> = ["table", "ifx", "mirror"]
            .into_iter()
            .map(|n| Arc::new(StubWriter::new(n)))
            .collect();
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::primary(writers[0].clone()),
                Destination::secondary(writers[1].clone()),
                Destination::other(writers[2].clone()),
            ],
            sink.clone(),
        )
        .unwrap();

        let timing = dispatcher.submit_all(&record()).await.unwrap();

        for writer in &writers {
            assert_eq!(writer.submissions().len(), 1, "{}", writer.name());
        }
        assert_eq!(timing.kind, "PackageAuditRecord");
        assert_eq!(sink.records(), vec![timing]);
    }

    #[tokio::test]
    async fn absent_secondary_records_zero_duration() {
        let sink = Arc::new(MemoryTimingSink::new());
        let writer = Arc::new(StubWriter::new("table").with_delay(Duration::from_millis(5)));
        let dispatcher =
            FanOutDispatcher::new(vec![Destination::primary(writer)], sink.clone()).unwrap();

        let timing = dispatcher.submit_all(&record()).await.unwrap();

        assert!(timing.primary >= Duration::from_millis(5));
        assert_eq!(timing.secondary, Duration::ZERO);
        assert!(timing.total >= timing.primary);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn no_destinations_still_writes_timing() {
        let sink = Arc::new(MemoryTimingSink::new());
        let dispatcher = FanOutDispatcher::new(Vec::new(), sink.clone()).unwrap();

        let timing = dispatcher.submit_all(&record()).await.unwrap();
        assert_eq!(timing.primary, Duration::ZERO);
        assert_eq!(timing.secondary, Duration::ZERO);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn destinations_run_concurrently() {
        let sink = Arc::new(MemoryTimingSink::new());
        let delay = Duration::from_millis(150);
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::primary(Arc::new(StubWriter::new("a").with_delay(delay))),
                Destination::secondary(Arc::new(StubWriter::new("b").with_delay(delay))),
                Destination::other(Arc::new(StubWriter::new("c").with_delay(delay))),
            ],
            sink,
        )
        .unwrap();

        let timing = dispatcher.submit_all(&record()).await.unwrap();
        assert!(timing.total < delay * 3, "total {:?}", timing.total);
    }

    #[tokio::test]
    async fn failure_surfaces_after_all_timing_is_recorded() {
        let sink = Arc::new(MemoryTimingSink::new());
        let secondary = Arc::new(StubWriter::new("ifx").with_delay(Duration::from_millis(20)));
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::primary(Arc::new(StubWriter::new("table").failing("table offline"))),
                Destination::secondary(secondary.clone()),
            ],
            sink.clone(),
        )
        .unwrap();

        let err = dispatcher.submit_all(&record()).await.unwrap_err();
        match err {
            DispatchError::Write {
                destination,
                source,
            } => {
                assert_eq!(destination, "table");
                assert!(source.to_string().contains("table offline"));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(secondary.submissions().len(), 1);
        let persisted = sink.records();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].secondary >= Duration::from_millis(20));
        assert!(persisted[0].total >= persisted[0].secondary);
    }

    #[tokio::test]
    async fn earliest_configured_failure_wins() {
        let sink = Arc::new(MemoryTimingSink::new());
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::primary(Arc::new(
                    StubWriter::new("slow")
                        .with_delay(Duration::from_millis(30))
                        .failing("slow failed"),
                )),
                Destination::other(Arc::new(StubWriter::new("fast").failing("fast failed"))),
            ],
            sink,
        )
        .unwrap();

        match dispatcher.submit_all(&record()).await {
            Err(DispatchError::Write { destination, .. }) => assert_eq!(destination, "slow"),
            _ => panic!("expected write error"),
        }
    }

    #[tokio::test]
    async fn panicking_destination_is_reported_as_write_error() {
        let sink = Arc::new(MemoryTimingSink::new());
        let survivor = Arc::new(StubWriter::new("ifx"));
        let dispatcher = FanOutDispatcher::new(
            vec![
                Destination::primary(Arc::new(StubWriter::new("table").panicking())),
                Destination::secondary(survivor.clone()),
            ],
            sink.clone(),
        )
        .unwrap();

        match dispatcher.submit_all(&record()).await {
            Err(DispatchError::Write {
                source: WriteError::Panicked(_),
                ..
            }) => {}
            _ => panic!("expected panicked write error"),
        }
        assert_eq!(survivor.submissions().len(), 1);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_the_write() {
        let writer = Arc::new(StubWriter::new("table"));
        let dispatcher =
            FanOutDispatcher::new(vec![Destination::primary(writer.clone())], Arc::new(FailingSink))
                .unwrap();

        assert!(dispatcher.submit_all(&record()).await.is_ok());
        assert_eq!(writer.submissions().len(), 1);
    }
}
