// ABOUTME: Defines LogRecord, the structured payload written to destinations and the error log.
// ABOUTME: Also builds the synthetic placeholder records used when stored data is corrupt or too large.

use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application name stamped on records that fanlog synthesizes itself.
pub const FANLOG_APPLICATION: &str = "fanlog";

/// Kind of the placeholder returned when a stored entry cannot be decoded.
pub const CORRUPTED_KIND: &str = "CorruptedEntry";

/// Kind of the placeholder stored when an entry would exceed the store's property limit.
pub const OVERSIZE_KIND: &str = "OversizeEntry";

/// Status code carried by corrupted-entry placeholders.
pub const CORRUPTED_STATUS: u16 = 999;

/// Status code carried by oversize placeholders.
pub const OVERSIZE_STATUS: u16 = 888;

/// A structured log record. `kind` is the stable discriminator used for timing
/// lines and for telling placeholder records apart from real ones.
///
/// `detail` and `secondary_detail` are the two free-text fields. They are
/// stored in their own table properties and are cleared from the primary
/// serialization, so they can grow large without pushing the rest of the
/// record past the store's limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub kind: String,
    pub application: String,
    pub host: String,
    pub status_code: u16,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub secondary_detail: Option<String>,
}

impl LogRecord {
    /// Create a record with the required fields. The host is the current
    /// machine, the time is now, and the optional fields default to None.
    pub fn new(kind: String, application: String, message: String) -> Self {
        Self {
            kind,
            application,
            host: machine_name(),
            status_code: 0,
            message,
            source: None,
            user: None,
            time: Utc::now(),
            detail: None,
            secondary_detail: None,
        }
    }

    /// Capture a handled error as a record. The display of the error is the
    /// message; the full source chain, one cause per line, becomes the detail.
    pub fn from_error(application: &str, err: &(dyn StdError + 'static)) -> Self {
        let mut chain = err.to_string();
        let mut cause = err.source();
        while let Some(inner) = cause {
            chain.push_str("\ncaused by: ");
            chain.push_str(&inner.to_string());
            cause = inner.source();
        }

        let mut record = Self::new("Error".to_string(), application.to_string(), err.to_string());
        record.status_code = 500;
        record.detail = Some(chain);
        record
    }

    /// Placeholder substituted for a stored entry that could not be decoded.
    pub fn corrupted(reason: Option<&str>) -> Self {
        let detail = match reason {
            Some(reason) => format!("Log entry is corrupted or missing in table store: {}", reason),
            None => "Log entry is corrupted or missing in table store".to_string(),
        };
        let mut record = Self::new(
            CORRUPTED_KIND.to_string(),
            FANLOG_APPLICATION.to_string(),
            "corrupted log entry".to_string(),
        );
        record.status_code = CORRUPTED_STATUS;
        record.detail = Some(detail);
        record
    }

    /// Placeholder stored in place of a record whose serialization would not
    /// fit. Keeps an excerpt of the offending serialization for diagnosis.
    pub fn oversize(excerpt: &str) -> Self {
        let mut record = Self::new(
            OVERSIZE_KIND.to_string(),
            FANLOG_APPLICATION.to_string(),
            "log entry exceeded the table store property limit".to_string(),
        );
        record.status_code = OVERSIZE_STATUS;
        record.detail = Some(format!(
            "Log entry will not fit in table store: {}",
            excerpt
        ));
        record
    }

    pub fn is_corrupted(&self) -> bool {
        self.kind == CORRUPTED_KIND
    }

    pub fn is_oversize(&self) -> bool {
        self.kind == OVERSIZE_KIND
    }
}

/// Best-effort identity of the current machine, read from the environment.
pub fn machine_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
