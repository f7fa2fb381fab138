//! The cluster ("pku") backend (§4.9) — dispatches a stage to whichever
//! worker owns it and polls the shared [`Store`] for its result.
//!
//! This is deliberately *not* built on top of [`controller::Engine`]: the
//! engine's post-run `cleanup()` deletes the whole `{namespace}-` prefix,
//! which is correct for a profile-driven whole-workflow run but would wipe
//! out sibling stages' state if reused per ad hoc `call()` nested inside a
//! DAG evaluation. Instead this dispatches and polls directly through
//! [`Invoker`]/[`Store`], bounded by a small retry count rather than the
//! engine's `failure_tolerance` abort.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use controller::Invoker;
use serde_json::Value;
use store::Store;
use tracing::warn;
use worker::{Address, StageInvocation, StageOutcome, TransportMode};

use crate::error::BackendError;
use crate::traits::Backend;

const MAX_RETRIES: u32 = 3;

/// Dispatches over the wire to a fixed worker schedule and polls `Store` for
/// each call's outcome (§4.4, §4.9).
pub struct ClusterBackend {
    namespace: String,
    schedule: HashMap<String, Address>,
    trans_mode: TransportMode,
    remote_call_timeout: Duration,
    post_ratio: f64,
    invoker: Arc<dyn Invoker>,
    store: Arc<dyn Store>,
}

impl ClusterBackend {
    pub fn new(
        namespace: impl Into<String>,
        schedule: HashMap<String, Address>,
        trans_mode: TransportMode,
        remote_call_timeout: Duration,
        post_ratio: f64,
        invoker: Arc<dyn Invoker>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            schedule,
            trans_mode,
            remote_call_timeout,
            post_ratio,
            invoker,
            store,
        }
    }

    fn address_for(&self, stage: &str) -> Result<Address, BackendError> {
        self.schedule
            .get(stage)
            .copied()
            .ok_or_else(|| BackendError::UnknownStage(stage.to_string()))
    }

    fn new_invocation(&self, stage: &str, params: Value) -> StageInvocation {
        StageInvocation::new(
            self.namespace.clone(),
            stage.to_string(),
            self.schedule.clone(),
            self.trans_mode,
            params,
            self.remote_call_timeout.as_secs_f64(),
            self.post_ratio,
        )
    }
}

#[async_trait]
impl Backend for ClusterBackend {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, BackendError> {
        let address = self.address_for(stage)?;
        let mut invocation = self.new_invocation(stage, params);

        for attempt in 0..MAX_RETRIES {
            invocation.remote_call();
            self.invoker.invoke(&address, invocation.clone()).await?;

            let outcome = self
                .store
                .get_blocking(&invocation.result_key(), Some(self.remote_call_timeout))
                .await?;

            match outcome {
                Some(value) => {
                    let outcome: StageOutcome = serde_json::from_value(value)
                        .map_err(|err| BackendError::Transport(err.to_string()))?;
                    return match outcome {
                        StageOutcome::Ok(value) => Ok(value),
                        StageOutcome::Err { exception, traceback } => {
                            Err(BackendError::StageFailed(format!("{exception}: {traceback}")))
                        }
                    };
                }
                None => {
                    warn!(stage, attempt, "cluster call timed out waiting for result, retrying");
                }
            }
        }

        Err(BackendError::Transport(format!(
            "stage '{stage}' produced no result after {MAX_RETRIES} tries"
        )))
    }

    async fn tell(&self, stage: &str, params: Value) -> Result<(), BackendError> {
        let address = self.address_for(stage)?;
        let mut invocation = self.new_invocation(stage, params);
        invocation.remote_call();
        self.invoker.invoke(&address, invocation).await?;
        Ok(())
    }
}
