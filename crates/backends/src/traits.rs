//! The `Backend` trait (Design Notes §9 "Per-backend branching in the
//! handler") — `call`/`tell` realized over a concrete transport (§4.9).
//!
//! Three adapters implement it: [`crate::local_once::LocalOnceBackend`],
//! [`crate::cluster::ClusterBackend`], and [`crate::vendor::VendorBackend`].
//! Two thin wrappers below let any `Backend` plug into the two places that
//! need a narrower trait: [`dag::StageInvoker`] (the DAG evaluator's `call`
//! seam) and [`durable::Dispatcher`] (the durable runtime's `call`+`tell`
//! seam) — so neither `dag` nor `durable` needs to depend on this crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;

/// What every backend realizes `call`/`tell` over (§4.9).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Invoke `stage` and wait for its result.
    async fn call(&self, stage: &str, params: Value) -> Result<Value, BackendError>;

    /// Fire-and-forget invoke `stage` (§4.9 Open Questions: resolved as
    /// "dispatch and do not await or store the result").
    async fn tell(&self, stage: &str, params: Value) -> Result<(), BackendError>;
}

/// Adapts any [`Backend`] to [`dag::StageInvoker`] for use as the `call()`
/// control node's callable (§4.1).
pub struct BackendInvoker<B: Backend + ?Sized>(std::sync::Arc<B>);

impl<B: Backend + ?Sized> BackendInvoker<B> {
    pub fn new(backend: std::sync::Arc<B>) -> Self {
        Self(backend)
    }
}

#[async_trait]
impl<B: Backend + ?Sized> dag::StageInvoker for BackendInvoker<B> {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, dag::DagError> {
        self.0.call(stage, params).await.map_err(|err| dag::DagError::StageFailed {
            stage: stage.to_string(),
            message: err.to_string(),
        })
    }
}

/// Adapts any [`Backend`] to [`durable::Dispatcher`] for use inside a
/// [`durable::DurableRuntime`].
pub struct BackendDispatcher<B: Backend + ?Sized>(std::sync::Arc<B>);

impl<B: Backend + ?Sized> BackendDispatcher<B> {
    pub fn new(backend: std::sync::Arc<B>) -> Self {
        Self(backend)
    }
}

#[async_trait]
impl<B: Backend + ?Sized> durable::Dispatcher for BackendDispatcher<B> {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, durable::DurableError> {
        self.0.call(stage, params).await.map_err(Into::into)
    }

    async fn tell(&self, stage: &str, params: Value) -> Result<(), durable::DurableError> {
        self.0.tell(stage, params).await.map_err(Into::into)
    }
}
