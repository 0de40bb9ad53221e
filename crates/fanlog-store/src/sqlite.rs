// ABOUTME: SQLite-backed TableStore giving the error log a durable partitioned table on local disk.
// ABOUTME: Conflicts come from the (partition_key, row_key) primary key; properties are stored as JSON.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fanlog_core::Properties;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::table::{StoreError, TableRow, TableStore};

/// A partitioned table stored in one SQLite table.
///
/// The connection is shared behind a mutex and every call runs on the
/// blocking thread pool, so the store can be used from many tasks at once.
#[derive(Clone)]
pub struct SqliteTable {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteTable {
    /// Open or create a database at `path` and ensure `table` exists.
    pub fn open(path: &Path, table: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Task(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table)
    }

    /// Use an in-memory database. Handy for tests that want real SQL semantics.
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidTableName(table.to_string()));
        }

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                properties TEXT NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            );"
        ))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection mutex poisoned".to_string()))?;
            f(&conn, &table)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Stored JSON that no longer parses degrades to an empty property set, which
/// the codec turns into a corrupted-entry placeholder.
fn parse_properties(json: &str, partition_key: &str, row_key: &str) -> Properties {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(
            "unreadable properties at {}/{}: {}",
            partition_key,
            row_key,
            e
        );
        Properties::new()
    })
}

#[async_trait]
impl TableStore for SqliteTable {
    async fn put_if_absent(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: Properties,
    ) -> Result<(), StoreError> {
        let partition_key = partition_key.to_string();
        let row_key = row_key.to_string();
        // A BTreeMap<String, String> always serializes.
        let json = serde_json::to_string(&properties).unwrap_or_default();

        self.with_conn(move |conn, table| {
            let result = conn.execute(
                &format!(
                    "INSERT INTO {table} (partition_key, row_key, properties) VALUES (?1, ?2, ?3)"
                ),
                params![partition_key, row_key, json],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Conflict {
                        partition_key,
                        row_key,
                    })
                }
                Err(e) => Err(StoreError::Sqlite(e)),
            }
        })
        .await
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Properties, StoreError> {
        let partition_key = partition_key.to_string();
        let row_key = row_key.to_string();

        self.with_conn(move |conn, table| {
            let json: Option<String> = conn
                .query_row(
                    &format!(
                        "SELECT properties FROM {table} WHERE partition_key = ?1 AND row_key = ?2"
                    ),
                    params![partition_key, row_key],
                    |row| row.get(0),
                )
                .optional()?;

            match json {
                Some(json) => Ok(parse_properties(&json, &partition_key, &row_key)),
                None => Err(StoreError::NotFound {
                    partition_key,
                    row_key,
                }),
            }
        })
        .await
    }

    async fn query_range(
        &self,
        partition_key: &str,
        start_row_key: &str,
        count: usize,
    ) -> Result<Vec<TableRow>, StoreError> {
        let partition_key = partition_key.to_string();
        let start_row_key = start_row_key.to_string();
        let limit = i64::try_from(count).unwrap_or(i64::MAX);

        self.with_conn(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT row_key, properties FROM {table}
                 WHERE partition_key = ?1 AND row_key >= ?2
                 ORDER BY row_key ASC LIMIT ?3"
            ))?;

            let rows = stmt.query_map(params![partition_key, start_row_key, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut result = Vec::new();
            for row in rows {
                let (row_key, json) = row?;
                let properties = parse_properties(&json, &partition_key, &row_key);
                result.push(TableRow {
                    row_key,
                    properties,
                });
            }
            Ok(result)
        })
        .await
    }
}
