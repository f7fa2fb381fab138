//! Handler factory (§6 "Glue (handler factory)") — binds a concrete
//! [`backends::Backend`] per `FAASIT_PROVIDER`, then ties it to a
//! [`dag::Workflow`] and [`stage::RouteTable`] to realize the top-level
//! `handler(event) -> object` ABI (§6 "Handler ABI").
//!
//! Grounded on the Data Flow paragraph: "user code registers stage handlers
//! and writes a workflow function that, given a builder, issues `call`...
//! A `handler(event)` invocation binds the DAG to a backend and evaluates
//! it."

use std::sync::Arc;

use backends::{Backend, BackendInvoker, ClusterBackend, LocalDiskStorage, LocalOnceBackend, VendorBackend};
use controller::{HttpInvoker, Invoker};
use dag::Workflow;
use serde_json::Value;
use stage::RouteTable;
use store::{MemoryStore, RedisStore, Store};
use tracing::info;

use crate::config::{GlueConfig, Provider};
use crate::error::GlueError;

/// Builds the concrete [`Backend`] named by `config.provider`, binding
/// `Store`/`Invoker` per the Open Question resolution for each provider
/// (`local`/`pku` share the cluster code path; `aliyun`/`knative`/`aws`
/// share the vendor one).
pub async fn build_backend(
    config: &GlueConfig,
    routes: Arc<RouteTable>,
) -> Result<Arc<dyn Backend>, GlueError> {
    match config.provider {
        Provider::LocalOnce => {
            let storage = Arc::new(LocalDiskStorage::new(&config.local_storage_dir, &config.namespace));
            Ok(Arc::new(LocalOnceBackend::new(routes, storage, config.namespace.clone())))
        }
        Provider::Local | Provider::Pku => {
            let store: Arc<dyn Store> = match &config.redis_host {
                Some(host) => {
                    info!(host, port = config.redis_port, "binding RedisStore for cluster backend");
                    Arc::new(RedisStore::connect(host, config.redis_port).await?)
                }
                None => Arc::new(MemoryStore::new()),
            };
            let invoker: Arc<dyn Invoker> = Arc::new(HttpInvoker::new(config.remote_call_timeout));
            Ok(Arc::new(ClusterBackend::new(
                config.namespace.clone(),
                config.schedule.clone(),
                config.trans_mode,
                config.remote_call_timeout,
                config.post_ratio,
                invoker,
                store,
            )))
        }
        Provider::Aliyun | Provider::Knative | Provider::Aws => {
            Ok(Arc::new(VendorBackend::new(config.function_urls.clone())))
        }
    }
}

/// Ties a built `Backend` to a user-authored workflow builder, realizing
/// `handler(event) -> object` (§6).
pub struct Handler {
    backend: Arc<dyn Backend>,
    build: Arc<dyn Fn(&Workflow) + Send + Sync>,
}

impl Handler {
    /// `build` is the user's workflow function: given a fresh [`Workflow`]
    /// builder it issues `call`/`func`/combinator operations and finishes
    /// with `end_with`.
    pub fn new(
        backend: Arc<dyn Backend>,
        build: impl Fn(&Workflow) + Send + Sync + 'static,
    ) -> Self {
        Self { backend, build: Arc::new(build) }
    }

    /// Build a fresh DAG from the workflow function, bind it to this
    /// handler's backend, and run it to completion against `event`.
    pub async fn invoke(&self, event: Value) -> Result<Value, GlueError> {
        let workflow = Workflow::new();
        (self.build)(&workflow);
        let invoker = BackendInvoker::new(self.backend.clone());
        let result = workflow.execute(event, &invoker).await?;
        Ok(result)
    }
}

/// Convenience constructor: read `FAASIT_PROVIDER` and friends from the
/// environment, build the backend, and wrap `build` into a [`Handler`].
///
/// # Errors
/// [`GlueError::UnknownProvider`] if the environment names an
/// unrecognized provider (§7 "fatal at construction").
pub async fn handler_from_env(
    routes: RouteTable,
    build: impl Fn(&Workflow) + Send + Sync + 'static,
) -> Result<Handler, GlueError> {
    let config = GlueConfig::from_env()?;
    let backend = build_backend(&config, Arc::new(routes)).await?;
    Ok(Handler::new(backend, build))
}
