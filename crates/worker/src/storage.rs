//! `ClusterStorage` — the [`stage::StageStorage`] bound to a stage while it
//! runs on a worker in the cluster ("pku") backend (§4.6 "Stage I/O
//! contract").
//!
//! Transport selection follows `redis_db.py` vs. `kv_cache.py`/
//! `cache_server.py`'s split: Store is used whenever the destination's
//! address is unknown, `trans_mode` is `all_redis`, or `trans_mode` is
//! `auto` and the two stages are not co-located on the same node; otherwise
//! the worker-cache path is used — pushed eagerly with `cache-put` when
//! `active_send`, or pulled with `cache-get`/raw TCP when `active_pull`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stage::{StageError, StageStorage};
use store::{keys, Store};

use crate::cache::WorkerCache;
use crate::invocation::{Address, TransportMode};
use crate::tcp_cache::Reply;
use crate::wire::WireRequest;

#[derive(Clone, Copy)]
enum Transport {
    Store,
    Cache(Address),
}

pub struct ClusterStorage {
    namespace: String,
    schedule: HashMap<String, Address>,
    own_address: Address,
    trans_mode: TransportMode,
    store: Arc<dyn Store>,
    cache: Arc<WorkerCache>,
    http: reqwest::Client,
}

impl ClusterStorage {
    pub fn new(
        namespace: String,
        schedule: HashMap<String, Address>,
        own_address: Address,
        trans_mode: TransportMode,
        store: Arc<dyn Store>,
        cache: Arc<WorkerCache>,
    ) -> Self {
        Self {
            namespace,
            schedule,
            own_address,
            trans_mode,
            store,
            cache,
            http: reqwest::Client::new(),
        }
    }

    fn transport_for(&self, stage: &str) -> Transport {
        match self.schedule.get(stage) {
            None => Transport::Store,
            Some(addr) => match self.trans_mode {
                TransportMode::AllRedis => Transport::Store,
                TransportMode::AllTcp => Transport::Cache(*addr),
                TransportMode::Auto => {
                    if addr.ip == self.own_address.ip {
                        Transport::Cache(*addr)
                    } else {
                        Transport::Store
                    }
                }
            },
        }
    }

    async fn push_cache_put(&self, addr: Address, key: &str, value: Value) -> Result<(), StageError> {
        let url = format!("http://{}:{}/", addr.ip, addr.port);
        let body = WireRequest::CachePut { key: key.to_string(), value };
        self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::Retryable(format!("cache-put to {url} failed: {e}")))?;
        Ok(())
    }

    async fn pull_cache_get_http(&self, addr: Address, key: &str) -> Result<Option<Value>, StageError> {
        let url = format!("http://{}:{}/", addr.ip, addr.port);
        let body = WireRequest::CacheGet { key: key.to_string() };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::Retryable(format!("cache-get to {url} failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = resp.bytes().await.map_err(|e| StageError::Retryable(e.to_string()))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| StageError::Fatal(format!("cache-get response was not valid JSON: {e}")))?;
        Ok(Some(value))
    }

    async fn pull_cache_get_tcp(&self, addr: Address, key: &str, timeout: Duration) -> Option<Value> {
        tcp_cache_get(addr, key, timeout).await
    }
}

#[async_trait]
impl StageStorage for ClusterStorage {
    async fn put(
        &self,
        dest_stages: &[String],
        key: &str,
        obj: Value,
        active_send: bool,
    ) -> Result<(), StageError> {
        if dest_stages.is_empty() {
            let full_key = keys::final_output(&self.namespace, key);
            return self
                .store
                .put(&full_key, obj)
                .await
                .map_err(|e| StageError::Fatal(e.to_string()));
        }

        for dest in dest_stages {
            match self.transport_for(dest) {
                Transport::Store => {
                    let full_key = keys::namespaced(&self.namespace, key);
                    self.store
                        .put(&full_key, obj.clone())
                        .await
                        .map_err(|e| StageError::Fatal(e.to_string()))?;
                }
                Transport::Cache(addr) => {
                    if active_send {
                        self.push_cache_put(addr, key, obj.clone()).await?;
                    } else {
                        self.cache.put(key.to_string(), obj.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        src_stage: &str,
        key: &str,
        timeout: Option<Duration>,
        active_pull: bool,
        tcp_direct: bool,
    ) -> Result<Value, StageError> {
        match self.transport_for(src_stage) {
            Transport::Store => {
                let full_key = keys::namespaced(&self.namespace, key);
                self.store
                    .get_blocking(&full_key, timeout)
                    .await
                    .map_err(|e| StageError::Fatal(e.to_string()))
                    .map(|v| v.unwrap_or(Value::Null))
            }
            Transport::Cache(addr) => {
                if active_pull {
                    if tcp_direct {
                        let value = self
                            .pull_cache_get_tcp(addr, key, timeout.unwrap_or(Duration::from_secs(5)))
                            .await;
                        Ok(value.unwrap_or(Value::Null))
                    } else {
                        Ok(self.pull_cache_get_http(addr, key).await?.unwrap_or(Value::Null))
                    }
                } else {
                    Ok(self.cache.get_blocking(key, timeout).await.unwrap_or(Value::Null))
                }
            }
        }
    }
}

async fn tcp_cache_get(addr: Address, key: &str, timeout: Duration) -> Option<Value> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let attempt = async {
        let mut stream = TcpStream::connect((addr.ip, addr.cache_port)).await.ok()?;
        stream.write_all(key.as_bytes()).await.ok()?;
        stream.shutdown().await.ok();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.ok()?;
        match Reply::from_bytes(&buf)? {
            Reply::Obj(bytes) => serde_json::from_slice(&bytes).ok(),
            Reply::Msg(msg) => {
                tracing::warn!(msg, "tcp cache-get returned an error reply");
                None
            }
        }
    };

    tokio::time::timeout(timeout, attempt).await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use store::MemoryStore;

    fn address(last_octet: u8) -> Address {
        Address { ip: Ipv4Addr::new(127, 0, 0, last_octet), port: 9000, cache_port: 9001 }
    }

    #[test]
    fn unknown_stage_routes_through_store() {
        let storage = ClusterStorage::new(
            "ns".to_string(),
            HashMap::new(),
            address(1),
            TransportMode::Auto,
            Arc::new(MemoryStore::new()),
            Arc::new(WorkerCache::with_capacity(8)),
        );
        assert!(matches!(storage.transport_for("ghost"), Transport::Store));
    }

    #[test]
    fn all_redis_always_routes_through_store_even_when_colocated() {
        let mut schedule = HashMap::new();
        schedule.insert("b".to_string(), address(1));
        let storage = ClusterStorage::new(
            "ns".to_string(),
            schedule,
            address(1),
            TransportMode::AllRedis,
            Arc::new(MemoryStore::new()),
            Arc::new(WorkerCache::with_capacity(8)),
        );
        assert!(matches!(storage.transport_for("b"), Transport::Store));
    }

    #[test]
    fn auto_mode_uses_cache_when_colocated_and_store_otherwise() {
        let mut schedule = HashMap::new();
        schedule.insert("same-node".to_string(), address(1));
        schedule.insert("other-node".to_string(), address(2));
        let storage = ClusterStorage::new(
            "ns".to_string(),
            schedule,
            address(1),
            TransportMode::Auto,
            Arc::new(MemoryStore::new()),
            Arc::new(WorkerCache::with_capacity(8)),
        );
        assert!(matches!(storage.transport_for("same-node"), Transport::Cache(_)));
        assert!(matches!(storage.transport_for("other-node"), Transport::Store));
    }

    #[test]
    fn all_tcp_uses_cache_regardless_of_node() {
        let mut schedule = HashMap::new();
        schedule.insert("other-node".to_string(), address(2));
        let storage = ClusterStorage::new(
            "ns".to_string(),
            schedule,
            address(1),
            TransportMode::AllTcp,
            Arc::new(MemoryStore::new()),
            Arc::new(WorkerCache::with_capacity(8)),
        );
        assert!(matches!(storage.transport_for("other-node"), Transport::Cache(_)));
    }

    #[tokio::test]
    async fn final_output_always_goes_through_store() {
        let store = Arc::new(MemoryStore::new());
        let storage = ClusterStorage::new(
            "ns-1".to_string(),
            HashMap::new(),
            address(1),
            TransportMode::Auto,
            store.clone(),
            Arc::new(WorkerCache::with_capacity(8)),
        );
        storage.put(&[], "final", Value::String("done".into()), false).await.unwrap();
        let stored = store.get(&keys::final_output("ns-1", "final")).await.unwrap();
        assert_eq!(stored, Some(Value::String("done".into())));
    }
}
