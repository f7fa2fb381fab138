//! `backends` crate — the three concrete realizations of `call`/`tell`
//! (§4.9 "Backend Adapter pattern"): local-once, cluster, and vendor FaaS.
//!
//! Everything above this crate (the DAG evaluator, the durable runtime)
//! only ever sees the narrow [`dag::StageInvoker`] / [`durable::Dispatcher`]
//! traits; this crate is where a concrete [`Backend`] is picked and adapted
//! to both.

pub mod cluster;
pub mod error;
pub mod local_once;
pub mod traits;
pub mod vendor;

pub use cluster::ClusterBackend;
pub use error::BackendError;
pub use local_once::{LocalDiskStorage, LocalOnceBackend};
pub use traits::{Backend, BackendDispatcher, BackendInvoker};
pub use vendor::VendorBackend;

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use dag::StageInvoker;
    use serde_json::json;
    use stage::{RouteTable, Stage, StageContext, StageError};
    use tempfile::TempDir;

    use super::*;

    struct Adder;

    #[async_trait::async_trait]
    impl Stage for Adder {
        async fn invoke(&self, params: serde_json::Value, _ctx: &StageContext) -> Result<serde_json::Value, StageError> {
            let lhs = params["lhs"].as_i64().unwrap_or_default();
            let rhs = params["rhs"].as_i64().unwrap_or_default();
            Ok(json!({ "res": lhs + rhs }))
        }
    }

    fn local_once_backend(tmp: &TempDir) -> LocalOnceBackend {
        let mut routes = RouteTable::new();
        routes.register("add", Arc::new(Adder)).unwrap();
        let storage = Arc::new(LocalDiskStorage::new(tmp.path(), "ns-test"));
        LocalOnceBackend::new(Arc::new(routes), storage, "ns-test")
    }

    #[tokio::test]
    async fn local_once_call_runs_inline_and_returns_the_result() {
        let tmp = TempDir::new().unwrap();
        let backend = local_once_backend(&tmp);
        let result = backend.call("add", json!({"lhs": 2, "rhs": 3})).await.unwrap();
        assert_eq!(result, json!({"res": 5}));
    }

    #[tokio::test]
    async fn local_once_call_rejects_an_unregistered_stage() {
        let tmp = TempDir::new().unwrap();
        let backend = local_once_backend(&tmp);
        let err = backend.call("ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, BackendError::UnknownStage(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn local_disk_storage_round_trips_a_value_through_lock_and_unlock() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalDiskStorage::new(tmp.path(), "ns-test");
        storage.put(&[], "k1", json!({"v": 1}), false).await.unwrap();
        let value = storage.get("producer", "k1", None, false, false).await.unwrap();
        assert_eq!(value, json!({"v": 1}));
    }

    #[tokio::test]
    async fn local_disk_storage_get_without_timeout_returns_null_for_a_missing_key() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalDiskStorage::new(tmp.path(), "ns-test");
        let value = storage.get("producer", "missing", None, false, false).await.unwrap();
        assert_eq!(value, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn backend_invoker_adapts_a_local_once_backend_into_the_dag_evaluator_seam() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(local_once_backend(&tmp));
        let invoker = BackendInvoker::new(backend);
        let result = invoker.call("add", json!({"lhs": 4, "rhs": 5})).await.unwrap();
        assert_eq!(result, json!({"res": 9}));
    }

    #[tokio::test]
    async fn backend_invoker_maps_an_unknown_stage_into_a_stage_failed_dag_error() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(local_once_backend(&tmp));
        let invoker = BackendInvoker::new(backend);
        let err = invoker.call("ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, dag::DagError::StageFailed { stage, .. } if stage == "ghost"));
    }

    #[tokio::test]
    async fn backend_dispatcher_adapts_a_local_once_backend_into_the_durable_runtime_seam() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(local_once_backend(&tmp));
        let dispatcher = BackendDispatcher::new(backend);
        let result = durable::Dispatcher::call(&dispatcher, "add", json!({"lhs": 1, "rhs": 1})).await.unwrap();
        assert_eq!(result, json!({"res": 2}));
    }
}
