// ABOUTME: Persistence layer for fanlog, mapping an append-only error log onto a partitioned table store.
// ABOUTME: Provides the TableStore seam with memory and SQLite backends, the logical log, and newest-first paging.

pub mod error_log;
pub mod logical;
pub mod memory;
pub mod sqlite;
pub mod table;

pub use error_log::{ErrorLog, ErrorLogEntry, Page, page_window, quiet_log};
pub use logical::{LogEntry, LogError, LogOptions, LogicalLog};
pub use memory::MemoryTable;
pub use sqlite::SqliteTable;
pub use table::{StoreError, TableRow, TableStore};
