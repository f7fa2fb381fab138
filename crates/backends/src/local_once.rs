//! The local-once backend (§4.9) — a single in-process execution with no
//! network hop at all. `call` routes and invokes the target [`Stage`]
//! inline on the current task; a nested DAG inside the callee runs to
//! completion before `call` returns. `tell` does the same invocation on a
//! spawned task and discards the result.
//!
//! Storage is a flat on-disk key/value store ([`LocalDiskStorage`]) guarded
//! by per-key lock files, used when no cluster/Store deployment exists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stage::{RouteTable, StageContext, StageError, StageStorage};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::traits::Backend;

const LOCK_SPIN_INTERVAL: Duration = Duration::from_millis(5);
const LOCK_SPIN_BUDGET: Duration = Duration::from_secs(5);

/// Local disk KV storage (§4.9): one file per key under `base_dir`, guarded
/// by a sibling `.lock` file acquired with `create_new` and released by
/// removal. Readers that find a key absent spin until `timeout` elapses.
pub struct LocalDiskStorage {
    base_dir: PathBuf,
    namespace: String,
}

impl LocalDiskStorage {
    pub fn new(base_dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self { base_dir: base_dir.into(), namespace: namespace.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace(['/', '\\'], "_");
        self.base_dir.join(format!("{}-{}.json", self.namespace, safe))
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut lock = path.as_os_str().to_owned();
        lock.push(".lock");
        PathBuf::from(lock)
    }

    async fn with_lock<T>(
        path: &Path,
        body: impl std::future::Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        let lock_path = Self::lock_path(path);
        let deadline = tokio::time::Instant::now() + LOCK_SPIN_BUDGET;
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&lock_path).await {
                Ok(_) => break,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(StageError::Fatal(format!(
                            "timed out acquiring lock for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_SPIN_INTERVAL).await;
                }
                Err(err) => {
                    return Err(StageError::Fatal(format!("lock file error: {err}")));
                }
            }
        }
        let result = body.await;
        let _ = fs::remove_file(&lock_path).await;
        result
    }
}

#[async_trait]
impl StageStorage for LocalDiskStorage {
    async fn put(
        &self,
        _dest_stages: &[String],
        key: &str,
        obj: Value,
        _active_send: bool,
    ) -> Result<(), StageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StageError::Fatal(format!("mkdir failed: {err}")))?;
        }
        Self::with_lock(&path, async {
            let bytes = serde_json::to_vec(&obj)
                .map_err(|err| StageError::Fatal(format!("serialize failed: {err}")))?;
            fs::write(&path, bytes)
                .await
                .map_err(|err| StageError::Fatal(format!("write failed: {err}")))
        })
        .await
    }

    async fn get(
        &self,
        _src_stage: &str,
        key: &str,
        timeout: Option<Duration>,
        _active_pull: bool,
        _tcp_direct: bool,
    ) -> Result<Value, StageError> {
        let path = self.path_for(key);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            if path.exists() {
                return Self::with_lock(&path, async {
                    let bytes = fs::read(&path)
                        .await
                        .map_err(|err| StageError::Fatal(format!("read failed: {err}")))?;
                    serde_json::from_slice(&bytes)
                        .map_err(|err| StageError::Fatal(format!("deserialize failed: {err}")))
                })
                .await;
            }
            match deadline {
                Some(deadline) if tokio::time::Instant::now() >= deadline => {
                    return Ok(Value::Null);
                }
                Some(_) => tokio::time::sleep(LOCK_SPIN_INTERVAL).await,
                None => return Ok(Value::Null),
            }
        }
    }
}

/// Single-process backend: everything runs inline, nothing crosses a
/// network boundary (§4.9 "local-once").
pub struct LocalOnceBackend {
    routes: std::sync::Arc<RouteTable>,
    storage: std::sync::Arc<LocalDiskStorage>,
    namespace: String,
}

impl LocalOnceBackend {
    pub fn new(
        routes: std::sync::Arc<RouteTable>,
        storage: std::sync::Arc<LocalDiskStorage>,
        namespace: impl Into<String>,
    ) -> Self {
        Self { routes, storage, namespace: namespace.into() }
    }

    fn context_for(&self, stage: &str) -> StageContext {
        StageContext {
            namespace: self.namespace.clone(),
            stage: stage.to_string(),
            storage: self.storage.clone(),
        }
    }
}

#[async_trait]
impl Backend for LocalOnceBackend {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, BackendError> {
        let handler = self.routes.route(stage)?;
        let ctx = self.context_for(stage);
        debug!(stage, "local-once call");
        Ok(handler.invoke(params, &ctx).await?)
    }

    async fn tell(&self, stage: &str, params: Value) -> Result<(), BackendError> {
        let handler = self.routes.route(stage)?;
        let ctx = self.context_for(stage);
        let stage_owned = stage.to_string();
        tokio::spawn(async move {
            if let Err(err) = handler.invoke(params, &ctx).await {
                warn!(stage = %stage_owned, error = %err, "local-once tell failed");
            }
        });
        Ok(())
    }
}
