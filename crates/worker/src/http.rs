//! The worker's HTTP host (§4.5, §6 "Worker HTTP") — a single `POST /`
//! endpoint dispatching on the wire request's `type`, plus `GET /health`.
//!
//! Grounded on `worker.py`'s `do_POST` dispatch (`lambda-call`/`cache-put`/
//! `cache-get`/`cache-clear`) and `faasit_runtime/worker.py`'s `/health`
//! shape (`{status: "UP", data: {...}}`).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use stage::RouteTable;
use store::Store;
use tracing::{error, info};

use crate::cache::WorkerCache;
use crate::dedup::{PushOutcome, RequestBuffer};
use crate::invocation::Address;
use crate::wire::WireRequest;

#[derive(Clone)]
pub struct WorkerState {
    pub routes: Arc<RouteTable>,
    pub store: Arc<dyn Store>,
    pub cache: Arc<WorkerCache>,
    pub buffer: Arc<RequestBuffer>,
    pub own_address: Address,
}

/// Build the axum router for one worker process.
pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/", post(handle_request))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "UP",
        "data": { "stages": state.routes.stage_names() },
    }))
}

async fn handle_request(State(state): State<WorkerState>, body: Bytes) -> Response {
    let request: WireRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Bad Request: {err}")).into_response();
        }
    };

    match request {
        WireRequest::LambdaCall { metadata } => {
            let id = metadata.id.clone();
            match state.buffer.try_push(metadata) {
                PushOutcome::Spawn => {
                    info!(id, "lambda-call queued");
                    tokio::spawn(crate::executor::execute(
                        id,
                        state.routes.clone(),
                        state.store.clone(),
                        state.cache.clone(),
                        state.buffer.clone(),
                        state.own_address,
                    ));
                }
                PushOutcome::Replaced => info!(id, "lambda-call replaced an older buffered try"),
                PushOutcome::Ignored => info!(id, "older lambda-call ignored"),
            }
            (StatusCode::OK, [("content-type", "application/octet-stream")]).into_response()
        }
        WireRequest::CachePut { key, value } => {
            state.cache.put(key, value);
            (StatusCode::OK, [("content-type", "application/octet-stream")]).into_response()
        }
        WireRequest::CacheGet { key } => match state.cache.get(&key) {
            Some(value) => match serde_json::to_vec(&value) {
                Ok(bytes) => (
                    StatusCode::OK,
                    [("content-type", "application/octet-stream")],
                    bytes,
                )
                    .into_response(),
                Err(err) => {
                    error!(%err, "failed to encode cached value");
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
                }
            },
            None => (StatusCode::NOT_FOUND, "Not Found: key not found in the cache").into_response(),
        },
        WireRequest::CacheClear { prefix } => {
            let cleared = state.cache.clear_with_prefix(&prefix);
            info!(prefix, cleared, "cache cleared by prefix");
            (StatusCode::OK, [("content-type", "application/octet-stream")]).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{StageInvocation, TransportMode};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use stage::mock::MockStage;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use store::MemoryStore;
    use tower::ServiceExt;

    fn test_state() -> WorkerState {
        let mut routes = RouteTable::new();
        routes
            .register("add", Arc::new(MockStage::returning("add", json!({"res": 2}))))
            .unwrap();
        WorkerState {
            routes: Arc::new(routes),
            store: Arc::new(MemoryStore::new()),
            cache: Arc::new(WorkerCache::with_capacity(8)),
            buffer: Arc::new(RequestBuffer::new()),
            own_address: Address { ip: Ipv4Addr::new(127, 0, 0, 1), port: 9000, cache_port: 9001 },
        }
    }

    #[tokio::test]
    async fn health_reports_registered_stages() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("UP"));
        assert_eq!(body["data"]["stages"], json!(["add"]));
    }

    #[tokio::test]
    async fn cache_put_then_cache_get_round_trips() {
        let app = router(test_state());

        let put_body = serde_json::to_vec(&WireRequest::CachePut {
            key: "k".to_string(),
            value: json!({"v": 1}),
        })
        .unwrap();
        let resp = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from(put_body)).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let get_body = serde_json::to_vec(&WireRequest::CacheGet { key: "k".to_string() }).unwrap();
        let resp = app
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from(get_body)).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"v": 1}));
    }

    #[tokio::test]
    async fn cache_get_of_missing_key_is_404() {
        let app = router(test_state());
        let get_body = serde_json::to_vec(&WireRequest::CacheGet { key: "ghost".to_string() }).unwrap();
        let resp = app
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from(get_body)).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lambda_call_is_queued_and_eventually_writes_a_result() {
        let state = test_state();
        let store = state.store.clone();
        let app = router(state);

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
        let result_key = invocation.result_key();

        let body = serde_json::to_vec(&WireRequest::LambdaCall { metadata: invocation }).unwrap();
        let resp = app
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Some(_) = store.get(&result_key).await.unwrap() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "result never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().method("POST").uri("/").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
