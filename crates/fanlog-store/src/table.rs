// ABOUTME: Defines the TableStore trait, the minimal CRUD-over-partition interface of a key-value table service.
// ABOUTME: Backends implement conditional insert, point get, and ascending range query within one partition.

use async_trait::async_trait;
use fanlog_core::Properties;
use thiserror::Error;

/// Errors surfaced by a table store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity already exists: {partition_key}/{row_key}")]
    Conflict {
        partition_key: String,
        row_key: String,
    },

    #[error("entity not found: {partition_key}/{row_key}")]
    NotFound {
        partition_key: String,
        row_key: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("store task failed: {0}")]
    Task(String),
}

/// One entity returned by a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub row_key: String,
    pub properties: Properties,
}

/// A partitioned key-value table. Within a partition, rows are ordered by
/// row key and can be read as a contiguous ascending range.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Insert an entity. Fails with `StoreError::Conflict` if the key exists.
    async fn put_if_absent(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: Properties,
    ) -> Result<(), StoreError>;

    /// Fetch one entity. Fails with `StoreError::NotFound` if absent.
    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Properties, StoreError>;

    /// Up to `count` entities of `partition_key` with row key >= `start_row_key`,
    /// in ascending row-key order.
    async fn query_range(
        &self,
        partition_key: &str,
        start_row_key: &str,
        count: usize,
    ) -> Result<Vec<TableRow>, StoreError>;
}
