//! The `Stage` trait — the contract every stage handler must fulfil — and
//! the storage handle (§4.6 "Stage I/O contract") passed alongside it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::StageError;

/// Handle through which a running stage reaches `storage.put` / `storage.get`
/// (§4.6). Concrete behaviour (Store vs. worker-cache, TCP vs. HTTP) is
/// supplied by the active backend; stage code only sees this trait.
#[async_trait]
pub trait StageStorage: Send + Sync {
    /// Write `obj` under `key`, scoped to this execution's namespace.
    ///
    /// `dest_stages` names the stages expected to read it back (empty means
    /// "final output", which always lands under the
    /// `{namespace}-__final_outputs__` prefix regardless of transport).
    /// `active_send` requests an eager `cache-put` push to each destination
    /// worker instead of a passive write awaiting `active_pull`.
    async fn put(
        &self,
        dest_stages: &[String],
        key: &str,
        obj: Value,
        active_send: bool,
    ) -> Result<(), StageError>;

    /// Read `key` as written by `src_stage`.
    ///
    /// `timeout` bounds a blocking wait for the value to appear.
    /// `active_pull` requests the reader dial out (`tcp_direct` picks the
    /// raw TCP cache server over HTTP `cache-get`) instead of waiting to be
    /// pushed to passively.
    async fn get(
        &self,
        src_stage: &str,
        key: &str,
        timeout: Option<Duration>,
        active_pull: bool,
        tcp_direct: bool,
    ) -> Result<Value, StageError>;

    /// Like `get`, but fails with [`StageError::MissingEntry`] if the value
    /// read back is empty (`Value::Null`) rather than returning it.
    async fn get_existed_object(
        &self,
        src_stage: &str,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, StageError> {
        match self.get(src_stage, key, timeout, false, false).await? {
            Value::Null => Err(StageError::MissingEntry(key.to_string())),
            other => Ok(other),
        }
    }
}

/// Context passed to every stage invocation.
#[derive(Clone)]
pub struct StageContext {
    /// `{app}-{engine_id}`; prefixes every Store key this execution writes.
    pub namespace: String,
    /// Name of the stage currently executing (as registered in the
    /// [`crate::RouteTable`]).
    pub stage: String,
    /// Storage handle bound by the active backend.
    pub storage: std::sync::Arc<dyn StageStorage>,
}

/// The core stage trait.
///
/// All built-in and user-registered stages implement this. The engine and
/// worker dispatch execution through this trait object — never through
/// direct function pointers — so that `Route Table` registration stays
/// uniform across backends.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Invoke the stage with `params`, returning its JSON result.
    async fn invoke(&self, params: Value, ctx: &StageContext) -> Result<Value, StageError>;
}
