//! `DurableRuntime` — §4.8. Wraps a sequential orchestrator body that
//! issues `call`/`tell`s, turning it into a resumable computation keyed by
//! an instance id.
//!
//! Design Notes §9 rules out exceptions-as-control-flow for suspension; the
//! source's `raise`/`except` pair is modeled here as a `DurableCtx::call`
//! that returns `Err(DurableError::Suspend(pc))`, propagated with `?` by the
//! orchestrator body exactly the way the source lets the exception unwind,
//! and caught only by [`DurableRuntime::step`] — its one "outer handler".
//! [`DurableRuntime::run_to_completion`] is a convenience for callers (and
//! tests) that want a single value back without driving the
//! suspend/resume cycle externally; it performs that cycle in-process by
//! replaying until every action's dispatch (parked in [`PendingCalls`] the
//! first time it outran the suspend budget) has been recovered.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use store::Store;
use tokio::sync::oneshot;

use crate::action::{ActionKind, ActionStatus, DurableActionLog};
use crate::dispatch::Dispatcher;
use crate::error::DurableError;
use crate::orchestrator::{OrchestratorMetadata, WaitingResult, WaitingResultRegistry};

/// A dispatch in flight past its suspend budget, keyed by the instance and
/// the `pc` of the `call` that launched it. Recovered by the next replay
/// pass instead of re-dispatching, so a slow stage is invoked at most once
/// per `call` regardless of how many times the orchestrator suspends on it.
#[derive(Default)]
struct PendingCalls {
    inner: Mutex<HashMap<(String, usize), oneshot::Receiver<Result<Value, DurableError>>>>,
}

impl PendingCalls {
    fn take(&self, instance_id: &str, pc: usize) -> Option<oneshot::Receiver<Result<Value, DurableError>>> {
        self.inner.lock().remove(&(instance_id.to_string(), pc))
    }

    fn put(&self, instance_id: String, pc: usize, rx: oneshot::Receiver<Result<Value, DurableError>>) {
        self.inner.lock().insert((instance_id, pc), rx);
    }
}

/// A user-authored durable workflow body (§3 GLOSSARY "Orchestrator").
/// Implementations call `ctx.call`/`ctx.tell` in the same sequence on every
/// replay — §8 "Durable idempotence" depends on that determinism, the same
/// way the source's recursive `durChain` always issues its three
/// `workeradd`s in the same order.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn run(&self, ctx: &DurableCtx) -> Result<Value, DurableError>;
}

/// Passed to [`Orchestrator::run`]; the only way orchestrator code reaches
/// a backend.
pub struct DurableCtx {
    instance_id: String,
    replay_index: AtomicUsize,
    log: Arc<Mutex<DurableActionLog>>,
    dispatcher: Arc<dyn Dispatcher>,
    store: Arc<dyn Store>,
    state_key: String,
    suspend_after: Duration,
    pending: Arc<PendingCalls>,
}

impl DurableCtx {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Invoke `stage` as the ctx's `pc`-th action this replay (§4.8).
    /// Returns the cached result without touching the backend if this
    /// action already completed on a previous pass. Otherwise recovers a
    /// dispatch already in flight from an earlier suspend on this same
    /// `pc` (never re-dispatching a slow call), or starts a fresh one, and
    /// either returns its value synchronously (if it finishes within the
    /// runtime's synchronous budget) or parks the dispatch and surfaces
    /// [`DurableError::Suspend`].
    pub async fn call(&self, stage: &str, params: Value) -> Result<Value, DurableError> {
        let pc = self.replay_index.fetch_add(1, Ordering::SeqCst);

        if let Some(value) = self.cached_completed(pc) {
            return Ok(value);
        }
        self.ensure_logged(pc, ActionKind::Call, stage, params.clone()).await?;

        let mut rx = match self.pending.take(&self.instance_id, pc) {
            Some(rx) => rx,
            None => {
                let dispatcher = self.dispatcher.clone();
                let stage_owned = stage.to_string();
                let params_owned = params.clone();
                let (tx, rx) = oneshot::channel();
                tokio::spawn(async move {
                    let result = dispatcher.call(&stage_owned, params_owned).await;
                    let _ = tx.send(result);
                });
                rx
            }
        };

        tokio::select! {
            res = &mut rx => {
                match res {
                    Ok(Ok(value)) => {
                        self.complete(pc, value.clone()).await?;
                        Ok(value)
                    }
                    Ok(Err(err)) => {
                        self.fail(pc).await?;
                        Err(err)
                    }
                    Err(_recv_dropped) => {
                        self.fail(pc).await?;
                        Err(DurableError::Backend("dispatch task was dropped before replying".to_string()))
                    }
                }
            }
            _ = tokio::time::sleep(self.suspend_after) => {
                tracing::debug!(pc, stage, "action exceeded the synchronous budget, suspending");
                self.pending.put(self.instance_id.clone(), pc, rx);
                Err(DurableError::Suspend(pc))
            }
        }
    }

    /// Fire-and-forget a `tell` (§4.9 Open Questions resolution: `tell`
    /// never awaits a stage result, so it never suspends — only the
    /// dispatch itself is awaited).
    pub async fn tell(&self, stage: &str, params: Value) -> Result<(), DurableError> {
        let pc = self.replay_index.fetch_add(1, Ordering::SeqCst);
        if self.cached_completed(pc).is_some() {
            return Ok(());
        }
        self.ensure_logged(pc, ActionKind::Tell, stage, params.clone()).await?;
        self.dispatcher.tell(stage, params).await?;
        self.complete(pc, Value::Null).await?;
        Ok(())
    }

    fn cached_completed(&self, pc: usize) -> Option<Value> {
        let log = self.log.lock();
        let action = log.at(pc)?;
        (action.status == ActionStatus::Completed).then(|| action.result.clone().unwrap_or(Value::Null))
    }

    async fn ensure_logged(&self, pc: usize, kind: ActionKind, stage: &str, params: Value) -> Result<(), DurableError> {
        let needs_write = {
            let mut log = self.log.lock();
            if log.at(pc).is_none() {
                log.push(kind, stage, params);
                true
            } else {
                false
            }
        };
        if needs_write {
            self.persist().await?;
        }
        Ok(())
    }

    async fn complete(&self, pc: usize, value: Value) -> Result<(), DurableError> {
        self.log.lock().complete(pc, value);
        self.persist().await
    }

    async fn fail(&self, pc: usize) -> Result<(), DurableError> {
        self.log.lock().fail(pc);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), DurableError> {
        let snapshot = self.log.lock().clone();
        let encoded = serde_json::to_value(&snapshot).map_err(|e| DurableError::CorruptLog(e.to_string()))?;
        self.store.put(&self.state_key, encoded).await?;
        Ok(())
    }
}

/// The outcome of one [`DurableRuntime::step`] pass.
pub enum DurableOutcome {
    Completed(Value),
    Suspended(WaitingResult),
}

/// Drives [`Orchestrator`] bodies through the checkpoint/replay protocol.
pub struct DurableRuntime {
    dispatcher: Arc<dyn Dispatcher>,
    store: Arc<dyn Store>,
    waiting: Arc<WaitingResultRegistry>,
    /// How long a `call` is allowed to take before [`DurableCtx::call`]
    /// gives up waiting and suspends instead (§4.8 "(i) receive the result
    /// synchronously, or (ii) raise DurableSuspend").
    suspend_after: Duration,
    /// Dispatches parked past their suspend budget, recovered by the next
    /// replay pass on the same instance instead of re-dispatched.
    pending: Arc<PendingCalls>,
}

impl DurableRuntime {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, store: Arc<dyn Store>, suspend_after: Duration) -> Self {
        Self {
            dispatcher,
            store,
            waiting: Arc::new(WaitingResultRegistry::new()),
            suspend_after,
            pending: Arc::new(PendingCalls::default()),
        }
    }

    /// The registry external callers can `wait()` an instance id on.
    pub fn waiting_results(&self) -> Arc<WaitingResultRegistry> {
        self.waiting.clone()
    }

    /// Run one replay pass: load the checkpointed log (applying `resume`
    /// if this pass is completing a previously suspended action), re-run
    /// `orchestrator.run` from the top, and persist whatever the log looks
    /// like when it returns (§5 ordering guarantee (iv)).
    pub async fn step(
        &self,
        instance: &OrchestratorMetadata,
        resume: Option<(usize, Value)>,
        orchestrator: &dyn Orchestrator,
    ) -> Result<DurableOutcome, DurableError> {
        let state_key = store::keys::orchestrator_state(&instance.id);
        let mut log = self.load_log(&state_key).await?;
        if let Some((pc, value)) = resume {
            log.complete(pc, value);
            self.persist_log(&state_key, &log).await?;
        }

        let log = Arc::new(Mutex::new(log));
        let ctx = DurableCtx {
            instance_id: instance.id.clone(),
            replay_index: AtomicUsize::new(0),
            log: log.clone(),
            dispatcher: self.dispatcher.clone(),
            store: self.store.clone(),
            state_key: state_key.clone(),
            suspend_after: self.suspend_after,
            pending: self.pending.clone(),
        };

        match orchestrator.run(&ctx).await {
            Ok(value) => {
                self.persist_log(&state_key, &log.lock().clone()).await?;
                self.waiting.complete(&instance.id, value.clone());
                Ok(DurableOutcome::Completed(value))
            }
            Err(DurableError::Suspend(_pc)) => {
                self.persist_log(&state_key, &log.lock().clone()).await?;
                Ok(DurableOutcome::Suspended(WaitingResult { instance_id: instance.id.clone() }))
            }
            Err(other) => Err(other),
        }
    }

    /// Drive [`DurableRuntime::step`] to completion without an external
    /// resume trigger: on a suspend, simply replay again. The dispatch that
    /// suspended is still running in the background and parked in
    /// [`PendingCalls`]; the replay's `call` at the same `pc` recovers it
    /// instead of issuing a second dispatch.
    pub async fn run_to_completion(
        &self,
        instance: &OrchestratorMetadata,
        orchestrator: &dyn Orchestrator,
    ) -> Result<Value, DurableError> {
        loop {
            match self.step(instance, None, orchestrator).await? {
                DurableOutcome::Completed(value) => return Ok(value),
                DurableOutcome::Suspended(_) => continue,
            }
        }
    }

    async fn load_log(&self, key: &str) -> Result<DurableActionLog, DurableError> {
        match self.store.get(key).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| DurableError::CorruptLog(e.to_string())),
            None => Ok(DurableActionLog::new()),
        }
    }

    async fn persist_log(&self, key: &str, log: &DurableActionLog) -> Result<(), DurableError> {
        let encoded = serde_json::to_value(log).map_err(|e| DurableError::CorruptLog(e.to_string()))?;
        self.store.put(key, encoded).await?;
        Ok(())
    }
}

/// Render a flat `stage -> params` call log into an ordered map for
/// assertions in tests (kept here, not under `#[cfg(test)]`, since
/// `backends`' own tests want it too).
pub fn target_sequence(log: &DurableActionLog) -> BTreeMap<usize, (ActionKind, String)> {
    log.actions.iter().map(|a| (a.pc, (a.kind, a.target.clone()))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use store::MemoryStore;

    struct EchoAdder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Dispatcher for EchoAdder {
        async fn call(&self, stage: &str, params: Value) -> Result<Value, DurableError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(stage, "workeradd");
            let a = params["lhs"].as_i64().unwrap_or(0);
            let b = params["rhs"].as_i64().unwrap_or(0);
            Ok(json!({ "res": a + b }))
        }

        async fn tell(&self, _stage: &str, _params: Value) -> Result<(), DurableError> {
            Ok(())
        }
    }

    struct DurChain;

    #[async_trait]
    impl Orchestrator for DurChain {
        async fn run(&self, ctx: &DurableCtx) -> Result<Value, DurableError> {
            let chain = |ctx: &DurableCtx| async move {
                let r1 = ctx.call("workeradd", json!({"lhs": 1, "rhs": 2})).await?;
                let r2 = ctx.call("workeradd", json!({"lhs": r1["res"], "rhs": 3})).await?;
                let r3 = ctx.call("workeradd", json!({"lhs": r2["res"], "rhs": 4})).await?;
                Ok::<Value, DurableError>(r3)
            };
            let a = chain(ctx).await?;
            let b = chain(ctx).await?;
            ctx.call("workeradd", json!({"lhs": a["res"], "rhs": b["res"]})).await
        }
    }

    #[tokio::test]
    async fn durable_recursion_matches_the_scripted_result() {
        let dispatcher = Arc::new(EchoAdder { calls: AtomicU32::new(0) });
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let runtime = DurableRuntime::new(dispatcher, store, Duration::from_secs(5));
        let instance = OrchestratorMetadata::new("inst-1", json!({}), None);

        let result = runtime.run_to_completion(&instance, &DurChain).await.unwrap();
        assert_eq!(result, json!({"res": 20}));
    }

    #[tokio::test]
    async fn a_zero_synchronous_budget_still_reaches_the_same_final_value() {
        let dispatcher = Arc::new(EchoAdder { calls: AtomicU32::new(0) });
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        // a suspend_after of zero forces every call to suspend on its first
        // pass; run_to_completion must still converge on the same result by
        // recovering each parked dispatch on replay rather than re-issuing it.
        let runtime = DurableRuntime::new(dispatcher.clone(), store.clone(), Duration::from_millis(0));
        let instance = OrchestratorMetadata::new("inst-2", json!({}), None);

        let result = runtime.run_to_completion(&instance, &DurChain).await.unwrap();
        assert_eq!(result, json!({"res": 20}));

        let state_key = store::keys::orchestrator_state("inst-2");
        let persisted = store.get(&state_key).await.unwrap().unwrap();
        let log: DurableActionLog = serde_json::from_value(persisted).unwrap();
        assert!(log.all_completed());
        assert_eq!(log.actions.len(), 7);
        // one dispatch per logged call, never two, even though every one of
        // them suspended at least once against a zero-length budget.
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 7);
    }
}
