//! `glue` crate — the handler factory (§6 "Glue (handler factory)").
//!
//! Reads `FAASIT_PROVIDER` and friends off the environment, binds the
//! matching `backends::Backend`, and exposes the top-level
//! `handler(event) -> object` callable user code is loaded through.

pub mod config;
pub mod error;
pub mod factory;

pub use config::{GlueConfig, Provider};
pub use error::GlueError;
pub use factory::{build_backend, handler_from_env, Handler};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use stage::{RouteTable, Stage, StageContext, StageError};
    use tempfile::TempDir;

    use super::*;

    struct Adder;

    #[async_trait]
    impl Stage for Adder {
        async fn invoke(&self, params: serde_json::Value, _ctx: &StageContext) -> Result<serde_json::Value, StageError> {
            let lhs = params["lhs"].as_i64().unwrap_or_default();
            let rhs = params["rhs"].as_i64().unwrap_or_default();
            Ok(json!({ "res": lhs + rhs }))
        }
    }

    fn config_for(provider: Provider, storage_dir: &TempDir) -> GlueConfig {
        GlueConfig {
            provider,
            func_name: None,
            local_storage_dir: storage_dir.path().to_string_lossy().into_owned(),
            redis_host: None,
            redis_port: 6379,
            namespace: "ns-glue-test".to_string(),
            schedule: Default::default(),
            function_urls: Default::default(),
            trans_mode: worker::TransportMode::Auto,
            remote_call_timeout: std::time::Duration::from_secs(1),
            post_ratio: 0.0,
        }
    }

    #[tokio::test]
    async fn local_once_handler_runs_a_single_call_workflow_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let mut routes = RouteTable::new();
        routes.register("add", Arc::new(Adder)).unwrap();

        let backend = build_backend(&config_for(Provider::LocalOnce, &tmp), Arc::new(routes))
            .await
            .unwrap();

        let handler = Handler::new(backend, |wf| {
            let event = wf.get_event();
            let lhs = event.get("lhs", None);
            let rhs = event.get("rhs", None);
            let sum = wf.call("add", vec![("lhs", lhs.into()), ("rhs", rhs.into())]);
            wf.end_with(sum);
        });

        let result = handler.invoke(json!({"lhs": 2, "rhs": 5})).await.unwrap();
        assert_eq!(result, json!({"res": 7}));
    }
}
