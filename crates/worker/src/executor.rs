//! Executes one [`StageInvocation`](crate::invocation::StageInvocation) that
//! has survived deduplication, grounded on `worker.py`'s `handler(identifier)`:
//! pop the latest buffered record, invoke the routed stage, and write the
//! outcome back to the shared `Store` under `{unique_execution_id}-result`
//! — the worker never replies with the result inline (§4.5).

use std::sync::Arc;

use stage::RouteTable;
use store::Store;
use tracing::{error, info, instrument};

use crate::cache::WorkerCache;
use crate::dedup::RequestBuffer;
use crate::invocation::{Address, StageOutcome};
use crate::storage::ClusterStorage;

#[instrument(skip(routes, store, cache, buffer), fields(id = %id))]
pub async fn execute(
    id: String,
    routes: Arc<RouteTable>,
    store: Arc<dyn Store>,
    cache: Arc<WorkerCache>,
    buffer: Arc<RequestBuffer>,
    own_address: Address,
) {
    let Some(invocation) = buffer.pop(&id) else {
        error!("executor started but nothing was buffered for this id");
        return;
    };

    let storage: Arc<dyn stage::StageStorage> = Arc::new(ClusterStorage::new(
        invocation.execution_namespace.clone(),
        invocation.schedule.clone(),
        own_address,
        invocation.trans_mode,
        store.clone(),
        cache,
    ));

    let ctx = stage::StageContext {
        namespace: invocation.execution_namespace.clone(),
        stage: invocation.stage.clone(),
        storage,
    };

    let outcome = match routes.route(&invocation.stage) {
        Ok(handler) => match handler.invoke(invocation.params.clone(), &ctx).await {
            Ok(value) => {
                info!(stage = %invocation.stage, "stage invocation succeeded");
                StageOutcome::Ok(value)
            }
            Err(err) => {
                error!(stage = %invocation.stage, %err, "stage invocation failed");
                StageOutcome::Err { exception: err.to_string(), traceback: String::new() }
            }
        },
        Err(err) => {
            error!(stage = %invocation.stage, %err, "no route registered for this stage");
            StageOutcome::Err { exception: err.to_string(), traceback: String::new() }
        }
    };

    let result_key = invocation.result_key();
    let payload = match serde_json::to_value(&outcome) {
        Ok(v) => v,
        Err(err) => {
            error!(%err, "failed to serialize stage outcome");
            return;
        }
    };
    if let Err(err) = store.put(&result_key, payload).await {
        error!(%err, key = %result_key, "failed to write invocation result to store");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{StageInvocation, TransportMode};
    use serde_json::{json, Value};
    use stage::mock::MockStage;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use store::MemoryStore;

    fn own_address() -> Address {
        Address { ip: Ipv4Addr::new(127, 0, 0, 1), port: 9000, cache_port: 9001 }
    }

    #[tokio::test]
    async fn successful_invocation_writes_ok_outcome_to_store() {
        let mut routes = RouteTable::new();
        routes
            .register(
                "add",
                Arc::new(MockStage::returning("add", json!({"res": 2}))),
            )
            .unwrap();
        let routes = Arc::new(routes);
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cache = Arc::new(WorkerCache::with_capacity(8));
        let buffer = Arc::new(RequestBuffer::new());

        let mut invocation = StageInvocation::new(
            "ns-1",
            "add",
            HashMap::new(),
            TransportMode::Auto,
            json!({"a": 1, "b": 1}),
            10.0,
            0.0,
        );
        invocation.remote_call();
        let id = invocation.id.clone();
        let result_key = invocation.result_key();
        buffer.try_push(invocation);

        execute(id, routes, store.clone(), cache, buffer, own_address()).await;

        let stored = store.get(&result_key).await.unwrap().unwrap();
        let outcome: StageOutcome = serde_json::from_value(stored).unwrap();
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn unknown_stage_writes_an_error_outcome() {
        let routes = Arc::new(RouteTable::new());
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cache = Arc::new(WorkerCache::with_capacity(8));
        let buffer = Arc::new(RequestBuffer::new());

        let mut invocation = StageInvocation::new(
            "ns-1",
            "ghost",
            HashMap::new(),
            TransportMode::Auto,
            Value::Null,
            10.0,
            0.0,
        );
        invocation.remote_call();
        let id = invocation.id.clone();
        let result_key = invocation.result_key();
        buffer.try_push(invocation);

        execute(id, routes, store.clone(), cache, buffer, own_address()).await;

        let stored = store.get(&result_key).await.unwrap().unwrap();
        let outcome: StageOutcome = serde_json::from_value(stored).unwrap();
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn failing_stage_writes_err_outcome() {
        let mut routes = RouteTable::new();
        routes
            .register("flaky", Arc::new(MockStage::failing_fatal("flaky", "boom")))
            .unwrap();
        let routes = Arc::new(routes);
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cache = Arc::new(WorkerCache::with_capacity(8));
        let buffer = Arc::new(RequestBuffer::new());

        let mut invocation = StageInvocation::new(
            "ns-1",
            "flaky",
            HashMap::new(),
            TransportMode::Auto,
            Value::Null,
            10.0,
            0.0,
        );
        invocation.remote_call();
        let id = invocation.id.clone();
        let result_key = invocation.result_key();
        buffer.try_push(invocation);

        execute(id, routes, store.clone(), cache, buffer, own_address()).await;

        let stored = store.get(&result_key).await.unwrap().unwrap();
        let outcome: StageOutcome = serde_json::from_value(stored).unwrap();
        assert!(!outcome.is_ok());
    }
}
