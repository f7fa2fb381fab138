//! `RedisStore` — the cluster/"pku" backend's [`Store`] implementation.
//!
//! Grounded on `redis_db.py`'s `RedisProxy`: one connection (here, one
//! `ConnectionManager`, which multiplexes and auto-reconnects) shared across
//! every call, `KEYS <prefix>*` for prefix scans, values serialized before
//! the round-trip. The original pickles; this serializes to JSON bytes
//! instead, since every value flowing through this system is already a
//! `serde_json::Value`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::{debug, info};

use crate::{Store, StoreError};

/// A `Store` backed by a shared Redis connection.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis://{host}:{port}`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, StoreError> {
        Self::connect_with_password(host, port, None).await
    }

    /// Connect to `redis://[:{password}@]{host}:{port}` (§6 `--redis_{ip,port,password}`).
    pub async fn connect_with_password(
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, StoreError> {
        info!(host, port, "connecting to redis");
        let url = match password {
            Some(password) => format!("redis://:{password}@{host}:{port}"),
            None => format!("redis://{host}:{port}"),
        };
        let client = redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&value)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, bytes).await?;
        debug!(key, "redis put succeeded");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&key).await? {
                pairs.push((key, value));
            }
        }
        Ok(pairs)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        Ok(removed)
    }
}
