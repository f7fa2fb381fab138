//! `WorkerCache` — the per-worker in-process KV (§4.5 "Worker", §4.6
//! "worker-cache direct" transport).
//!
//! Grounded on `kv_cache.py`'s `KVCache`: a map guarded by a condition
//! variable, `get(key, timeout)` blocking until a `put` notifies every
//! waiter or the deadline passes, `clear_with_prefix` for namespace cleanup.
//! Eviction is a resolved Open Question (see DESIGN.md): bounded FIFO with
//! an explicit capacity, oldest entry evicted first once full, independent
//! of prefix-based clearing.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::timeout as tokio_timeout;

struct Inner {
    entries: HashMap<String, Value>,
    order: VecDeque<String>,
    capacity: usize,
}

/// In-memory KV cache local to one worker process.
pub struct WorkerCache {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl WorkerCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
            notify: Notify::new(),
        }
    }

    /// Insert `value` under `key`, evicting the oldest entry first if the
    /// cache is already at capacity.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        {
            let mut inner = self.inner.lock();
            if !inner.entries.contains_key(&key) {
                inner.order.push_back(key.clone());
            }
            inner.entries.insert(key, value);
            while inner.entries.len() > inner.capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// A single non-blocking read.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Block until `key` appears or `timeout` elapses. `timeout: None`
    /// degrades to one non-blocking attempt.
    pub async fn get_blocking(&self, key: &str, timeout: Option<Duration>) -> Option<Value> {
        if let Some(v) = self.get(key) {
            return Some(v);
        }
        let Some(timeout) = timeout else { return None };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::warn!(key, "worker cache get timed out");
                return None;
            }
            let notified = self.notify.notified();
            if let Some(v) = self.get(key) {
                return Some(v);
            }
            let _ = tokio_timeout(remaining, notified).await;
            if let Some(v) = self.get(key) {
                return Some(v);
            }
        }
    }

    /// Evict every key starting with `prefix`; returns the count removed.
    pub fn clear_with_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let victims: Vec<String> =
            inner.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        for key in &victims {
            inner.entries.remove(key);
        }
        inner.order.retain(|k| !victims.contains(k));
        victims.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_roundtrips() {
        let cache = WorkerCache::with_capacity(8);
        cache.put("a", json!(1));
        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn capacity_overflow_evicts_oldest_first() {
        let cache = WorkerCache::with_capacity(2);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.put("c", json!(3));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.get("c"), Some(json!(3)));
    }

    #[test]
    fn clear_with_prefix_removes_only_matching_keys() {
        let cache = WorkerCache::with_capacity(8);
        cache.put("ns1-x", json!(1));
        cache.put("ns2-y", json!(2));
        let removed = cache.clear_with_prefix("ns1-");
        assert_eq!(removed, 1);
        assert_eq!(cache.get("ns1-x"), None);
        assert_eq!(cache.get("ns2-y"), Some(json!(2)));
    }

    #[tokio::test]
    async fn get_blocking_wakes_up_on_put() {
        let cache = std::sync::Arc::new(WorkerCache::with_capacity(8));
        let waiter = cache.clone();
        let handle = tokio::spawn(async move {
            waiter.get_blocking("late", Some(Duration::from_secs(2))).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.put("late", json!("ready"));

        let result = handle.await.unwrap();
        assert_eq!(result, Some(json!("ready")));
    }

    #[tokio::test]
    async fn get_blocking_times_out_when_never_written() {
        let cache = WorkerCache::with_capacity(8);
        let result = cache.get_blocking("never", Some(Duration::from_millis(50))).await;
        assert_eq!(result, None);
    }
}
