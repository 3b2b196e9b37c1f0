//! In-memory store client for tests and diagnostics.
//!
//! Records writes batch by batch so tests can assert both the flushed
//! row sequence and the batch boundaries it arrived in.

use super::{StoreClient, StoreError};
use crate::relay::command::Row;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// In-memory store: each target keeps the list of batches written to it.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<String, Vec<Vec<Row>>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Batches written to a target, in arrival order.
    pub fn batches_for(&self, target: &str) -> Vec<Vec<Row>> {
        self.data.read().get(target).cloned().unwrap_or_default()
    }

    /// All rows written to a target, flattened across batches, in order.
    pub fn rows_for(&self, target: &str) -> Vec<Row> {
        self.data
            .read()
            .get(target)
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Targets that have received at least one batch, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn total_rows(&self) -> usize {
        self.data
            .read()
            .values()
            .flat_map(|batches| batches.iter())
            .map(|b| b.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Clone for InMemoryStore {
    fn clone(&self) -> Self {
        InMemoryStore {
            data: Arc::clone(&self.data),
        }
    }
}

impl StoreClient for InMemoryStore {
    fn write_batch<'a>(
        &'a self,
        target: &'a str,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            debug_assert!(!rows.is_empty(), "Precondition: batch must not be empty");
            self.data
                .write()
                .entry(target.to_string())
                .or_default()
                .push(rows.to_vec());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::command::Row;

    fn row(n: u32) -> Row {
        Row::from_fields([n.to_string()])
    }

    #[tokio::test]
    async fn test_batches_recorded_separately() {
        let store = InMemoryStore::new();
        store.write_batch("events", &[row(1), row(2)]).await.unwrap();
        store.write_batch("events", &[row(3)]).await.unwrap();

        let batches = store.batches_for("events");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(store.total_rows(), 3);
    }

    #[tokio::test]
    async fn test_rows_flattened_in_order() {
        let store = InMemoryStore::new();
        store.write_batch("events", &[row(1), row(2)]).await.unwrap();
        store.write_batch("events", &[row(3), row(4)]).await.unwrap();

        let rows = store.rows_for("events");
        let values: Vec<_> = rows
            .iter()
            .map(|r| String::from_utf8_lossy(&r.fields()[0]).into_owned())
            .collect();
        assert_eq!(values, ["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_targets_isolated() {
        let store = InMemoryStore::new();
        store.write_batch("a", &[row(1)]).await.unwrap();
        store.write_batch("b", &[row(2)]).await.unwrap();

        assert_eq!(store.targets(), ["a", "b"]);
        assert_eq!(store.rows_for("a").len(), 1);
        assert_eq!(store.rows_for("b").len(), 1);
    }
}
