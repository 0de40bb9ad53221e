// ABOUTME: In-memory TableStore backed by an ordered map, for tests and embedded use.
// ABOUTME: Conditional inserts are serialized by a tokio RwLock so concurrent appenders see conflicts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fanlog_core::Properties;
use tokio::sync::RwLock;

use crate::table::{StoreError, TableRow, TableStore};

/// A table held entirely in memory. Keys are `(partition_key, row_key)`.
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: RwLock<BTreeMap<(String, String), Properties>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an entity unconditionally. Lets tests plant damaged rows.
    pub async fn insert_raw(&self, partition_key: &str, row_key: &str, properties: Properties) {
        self.rows
            .write()
            .await
            .insert((partition_key.to_string(), row_key.to_string()), properties);
    }

    /// Total number of entities across all partitions.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TableStore for MemoryTable {
    async fn put_if_absent(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: Properties,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let key = (partition_key.to_string(), row_key.to_string());
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict {
                partition_key: key.0,
                row_key: key.1,
            });
        }
        rows.insert(key, properties);
        Ok(())
    }

    async fn get(&self, partition_key: &str, row_key: &str) -> Result<Properties, StoreError> {
        self.rows
            .read()
            .await
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                partition_key: partition_key.to_string(),
                row_key: row_key.to_string(),
            })
    }

    async fn query_range(
        &self,
        partition_key: &str,
        start_row_key: &str,
        count: usize,
    ) -> Result<Vec<TableRow>, StoreError> {
        let rows = self.rows.read().await;
        let start = (partition_key.to_string(), start_row_key.to_string());
        Ok(rows
            .range(start..)
            .take_while(|((pk, _), _)| pk == partition_key)
            .take(count)
            .map(|((_, rk), properties)| TableRow {
                row_key: rk.clone(),
                properties: properties.clone(),
            })
            .collect())
    }
}
