//! The `Store` trait (§2, §4.6) — shared mutable key/value storage, the one
//! piece of cross-process state every backend and the controller's engines
//! agree on. Single-writer-per-key by construction (§9 "Resource policy"):
//! callers are responsible for choosing keys (namespace-prefixed,
//! execution-id-suffixed) that no two writers ever contend over.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreError;

/// Shared KV store abstraction. Implementations: [`crate::memory::MemoryStore`]
/// (single process, tests and `local-once`) and [`crate::redis_store::RedisStore`]
/// (the cluster/"pku" backend).
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `value` under `key`, replacing any existing value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read `key`. A single non-blocking attempt — this is the "engine
    /// polls `{uid}-result`" shape from §4.4.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Delete `key`, if present.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All `(key, value)` pairs whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Delete every key starting with `prefix`; returns the count removed.
    /// Used by the controller's post-run namespace cleanup (§4.4, §8
    /// "Namespace isolation").
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    /// Block until `key` appears or `timeout` elapses, polling every
    /// 100ms. `timeout: None` degrades to a single non-blocking [`Store::get`]
    /// — the same distinction the original Redis proxy drew between its
    /// blocking and non-blocking `get`.
    async fn get_blocking(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, StoreError> {
        const POLL_INTERVAL: Duration = Duration::from_millis(100);

        if let Some(value) = self.get(key).await? {
            return Ok(Some(value));
        }
        let Some(timeout) = timeout else {
            return Ok(None);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                tracing::warn!(key, "get_blocking timed out");
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            if let Some(value) = self.get(key).await? {
                return Ok(Some(value));
            }
        }
    }
}
