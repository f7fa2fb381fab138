//! `MemoryStore` — an in-process [`Store`] backed by `dashmap`.
//!
//! Used for unit/integration tests and for the `local-once` backend, where
//! "shared" only needs to mean "shared within this process".

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::{Store, StoreError};

/// Sharded, lock-striped in-memory KV store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let victims: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &victims {
            self.entries.remove(key);
        }
        Ok(victims.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put("ns-key", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("ns-key").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn get_of_absent_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_prefix_removes_only_matching_keys() {
        let store = MemoryStore::new();
        store.put("ns-a", json!(1)).await.unwrap();
        store.put("ns-b", json!(2)).await.unwrap();
        store.put("other-c", json!(3)).await.unwrap();

        let removed = store.delete_prefix("ns-").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("ns-a").await.unwrap(), None);
        assert_eq!(store.get("other-c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn scan_prefix_returns_matching_pairs() {
        let store = MemoryStore::new();
        store.put("ns-a", json!(1)).await.unwrap();
        store.put("ns-b", json!(2)).await.unwrap();
        store.put("zz-c", json!(3)).await.unwrap();

        let mut found = store.scan_prefix("ns-").await.unwrap();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(found, vec![("ns-a".to_string(), json!(1)), ("ns-b".to_string(), json!(2))]);
    }

    #[tokio::test]
    async fn get_blocking_without_timeout_is_a_single_nonblocking_attempt() {
        let store = MemoryStore::new();
        let result = store.get_blocking("ghost", None).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn get_blocking_observes_a_value_written_after_the_wait_starts() {
        use std::sync::Arc;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            writer.put("late", json!("arrived")).await.unwrap();
        });

        let result = store.get_blocking("late", Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(result, Some(json!("arrived")));
    }
}
