//! The per-instance controller state machine (§4.4 "Engine main loop").
//!
//! Grounded on `engine.py`'s polling loop and in the teacher's
//! `ExecutorConfig`/`WorkflowExecutor` shape (`crates/engine/src/executor.rs`):
//! a config struct with sane defaults, `#[instrument]` on the public entry
//! point, and explicit `info!`/`warn!`/`error!` logging at every state
//! transition. Unlike the teacher's single in-process retry loop, firing
//! here is driven by polling a shared [`store::Store`] for results a remote
//! worker writes asynchronously (§4.5) rather than awaiting a local call
//! directly.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use store::Store;
use tracing::{error, info, instrument, warn};
use worker::{Address, StageInvocation, StageOutcome, TransportMode, WireRequest};

use crate::error::EngineError;
use crate::invoke::Invoker;

/// Launches one stage's next try and returns the invocation record tracking
/// it (§3 "exec_func: stage -> () -> StageInvocation" — the controller
/// calls this both for a stage's first dispatch and for every retry).
#[async_trait]
pub trait StageDispatcher: Send + Sync {
    async fn dispatch(&self, stage: &str) -> Result<StageInvocation, EngineError>;
}

/// Dispatches by minting a fresh [`StageInvocation`] for `stage` and handing
/// it to an [`Invoker`] addressed by the placement schedule.
pub struct RemoteDispatcher {
    namespace: String,
    schedule: HashMap<String, Address>,
    trans_mode: TransportMode,
    params: HashMap<String, Value>,
    remote_call_timeout: f64,
    post_ratio: f64,
    invoker: Arc<dyn Invoker>,
}

impl RemoteDispatcher {
    pub fn new(
        namespace: impl Into<String>,
        schedule: HashMap<String, Address>,
        trans_mode: TransportMode,
        params: HashMap<String, Value>,
        remote_call_timeout: f64,
        post_ratio: f64,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self { namespace: namespace.into(), schedule, trans_mode, params, remote_call_timeout, post_ratio, invoker }
    }
}

#[async_trait]
impl StageDispatcher for RemoteDispatcher {
    async fn dispatch(&self, stage: &str) -> Result<StageInvocation, EngineError> {
        let address =
            self.schedule.get(stage).copied().ok_or_else(|| EngineError::UnknownStage(stage.to_string()))?;
        let params = self.params.get(stage).cloned().unwrap_or(Value::Null);
        let mut invocation = StageInvocation::new(
            self.namespace.clone(),
            stage,
            self.schedule.clone(),
            self.trans_mode,
            params,
            self.remote_call_timeout,
            self.post_ratio,
        );
        invocation.remote_call();
        self.invoker.invoke(&address, invocation.clone()).await?;
        Ok(invocation)
    }
}

#[derive(Debug, Clone)]
enum StageState {
    Pending,
    Executing { invocation: StageInvocation, deadline: Instant },
    Success(Value),
}

/// Tunables for one [`Engine::run`] (§6 controller CLI flags).
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub failure_tolerance: u32,
    pub get_outputs: bool,
    pub outputs_dir: Option<PathBuf>,
    /// Outer bound on the whole run (§4.4 "bounded outer join timeout") —
    /// a workflow that never converges within this window is treated as a
    /// fatal failure rather than hanging the controller process forever.
    pub join_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            failure_tolerance: 100,
            get_outputs: false,
            outputs_dir: None,
            join_timeout: Duration::from_secs(3600),
        }
    }
}

type SharedStates = Arc<Mutex<HashMap<String, StageState>>>;
type SharedLaunched = Arc<Mutex<HashSet<String>>>;

/// One workflow instance's state-machine loop.
///
/// Every stage starts `Pending`. A stage whose dependencies are all
/// `Success` is dispatched and becomes `Executing`; polling the shared
/// store for its result either promotes it to `Success` or — on an error
/// outcome, a deserialize failure, or a missed deadline — resets it to
/// `Pending` and counts a failure. The loop ends once every stage is
/// `Success`; exceeding `failure_tolerance` aborts the process (§4.4).
pub struct Engine {
    namespace: String,
    dependencies: HashMap<String, Vec<String>>,
    schedule: HashMap<String, Address>,
    dispatcher: Arc<dyn StageDispatcher>,
    store: Arc<dyn Store>,
    config: EngineConfig,
    /// (delay in seconds from engine start, stage) pre-warm timers
    /// (`deployment.py`'s `get_worker_start_point`).
    timers: Vec<(f64, String)>,
}

impl Engine {
    pub fn new(
        namespace: impl Into<String>,
        dependencies: HashMap<String, Vec<String>>,
        schedule: HashMap<String, Address>,
        dispatcher: Arc<dyn StageDispatcher>,
        store: Arc<dyn Store>,
        config: EngineConfig,
        timers: Vec<(f64, String)>,
    ) -> Self {
        Self { namespace: namespace.into(), dependencies, schedule, dispatcher, store, config, timers }
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn run(&self) -> HashMap<String, Value> {
        let states: SharedStates =
            Arc::new(Mutex::new(self.dependencies.keys().map(|s| (s.clone(), StageState::Pending)).collect()));
        let launched: SharedLaunched = Arc::new(Mutex::new(HashSet::new()));
        let failures = Arc::new(AtomicU32::new(0));

        let mut timer_handles = Vec::new();
        for (delay, stage) in &self.timers {
            let states = states.clone();
            let launched = launched.clone();
            let dispatcher = self.dispatcher.clone();
            let stage = stage.clone();
            let delay = Duration::from_secs_f64(delay.max(0.0));
            timer_handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let first_to_launch = launched.lock().insert(stage.clone());
                if !first_to_launch {
                    return;
                }
                match dispatcher.dispatch(&stage).await {
                    Ok(invocation) => {
                        let deadline = Instant::now() + Duration::from_secs_f64(invocation.remote_call_timeout);
                        info!(stage, "pre-warm dispatch sent");
                        states.lock().insert(stage.clone(), StageState::Executing { invocation, deadline });
                    }
                    Err(err) => warn!(stage, %err, "pre-warm dispatch failed"),
                }
            }));
        }

        let outcome =
            tokio::time::timeout(self.config.join_timeout, self.main_loop(states, launched, failures)).await;

        for handle in timer_handles {
            handle.abort();
        }

        match outcome {
            Ok(outputs) => outputs,
            Err(_) => {
                error!(timeout = ?self.config.join_timeout, "engine join timed out, aborting");
                std::process::exit(1);
            }
        }
    }

    async fn main_loop(
        &self,
        states: SharedStates,
        launched: SharedLaunched,
        failures: Arc<AtomicU32>,
    ) -> HashMap<String, Value> {
        loop {
            let executing: Vec<(String, StageInvocation, Instant)> = {
                let s = states.lock();
                s.iter()
                    .filter_map(|(stage, state)| match state {
                        StageState::Executing { invocation, deadline } => {
                            Some((stage.clone(), invocation.clone(), *deadline))
                        }
                        _ => None,
                    })
                    .collect()
            };

            for (stage, invocation, deadline) in executing {
                match self.store.get(&invocation.result_key()).await {
                    Ok(Some(value)) => match serde_json::from_value::<StageOutcome>(value) {
                        Ok(StageOutcome::Ok(v)) => {
                            info!(stage, "stage succeeded");
                            states.lock().insert(stage.clone(), StageState::Success(v));
                        }
                        Ok(StageOutcome::Err { exception, .. }) => {
                            if self.record_failure(&stage, &exception, &states, &failures) {
                                self.abort(&stage);
                            }
                        }
                        Err(err) => {
                            if self.record_failure(&stage, &err.to_string(), &states, &failures) {
                                self.abort(&stage);
                            }
                        }
                    },
                    Ok(None) => {
                        if Instant::now() >= deadline
                            && self.record_failure(&stage, "remote call timed out", &states, &failures)
                        {
                            self.abort(&stage);
                        }
                    }
                    Err(err) => {
                        warn!(stage, %err, "store read failed while polling, will retry next tick");
                    }
                }
            }

            let ready: Vec<String> = {
                let s = states.lock();
                self.dependencies
                    .iter()
                    .filter(|(stage, deps)| {
                        matches!(s.get(stage.as_str()), Some(StageState::Pending))
                            && deps.iter().all(|d| matches!(s.get(d.as_str()), Some(StageState::Success(_))))
                    })
                    .map(|(stage, _)| stage.clone())
                    .collect()
            };

            for stage in ready {
                launched.lock().insert(stage.clone());
                match self.dispatcher.dispatch(&stage).await {
                    Ok(invocation) => {
                        let deadline = Instant::now() + Duration::from_secs_f64(invocation.remote_call_timeout);
                        info!(stage, "stage dispatched");
                        states.lock().insert(stage.clone(), StageState::Executing { invocation, deadline });
                    }
                    Err(err) => {
                        if self.record_failure(&stage, &err.to_string(), &states, &failures) {
                            self.abort(&stage);
                        }
                    }
                }
            }

            if states.lock().values().all(|s| matches!(s, StageState::Success(_))) {
                break;
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        self.cleanup().await;

        states
            .lock()
            .iter()
            .filter_map(|(stage, state)| match state {
                StageState::Success(v) => Some((stage.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    /// Record a stage failure, resetting it to `Pending` so the next loop
    /// tick retries it, and report whether `failure_tolerance` has now
    /// been exceeded. Deliberately free of `std::process::exit` so the
    /// tolerance arithmetic stays unit-testable; [`Engine::abort`] is what
    /// actually ends the process once a caller sees `true`.
    fn record_failure(&self, stage: &str, message: &str, states: &SharedStates, failures: &Arc<AtomicU32>) -> bool {
        warn!(stage, message, "recording a stage failure");
        states.lock().insert(stage.to_string(), StageState::Pending);
        let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
        count >= self.config.failure_tolerance
    }

    fn abort(&self, stage: &str) -> ! {
        error!(stage, tolerance = self.config.failure_tolerance, "failure tolerance exceeded, aborting");
        std::process::exit(1);
    }

    async fn cleanup(&self) {
        let client = reqwest::Client::new();
        for addr in self.schedule.values() {
            let url = format!("http://{}:{}/", addr.ip, addr.port);
            let body = WireRequest::CacheClear { prefix: format!("{}-", self.namespace) };
            if let Err(err) = client.post(&url).json(&body).send().await {
                warn!(url, %err, "best-effort cache-clear failed");
            }
        }

        if self.config.get_outputs {
            if let Some(dir) = &self.config.outputs_dir {
                if let Err(err) = self.dump_outputs(dir).await {
                    warn!(%err, "failed to dump final outputs");
                }
            }
        }

        match self.store.delete_prefix(&format!("{}-", self.namespace)).await {
            Ok(removed) => info!(removed, "namespace cleaned up"),
            Err(err) => warn!(%err, "namespace cleanup failed"),
        }
    }

    async fn dump_outputs(&self, dir: &std::path::Path) -> Result<(), EngineError> {
        let prefix = store::keys::final_outputs_prefix(&self.namespace);
        let pairs = self.store.scan_prefix(&prefix).await?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| EngineError::Io(e.to_string()))?;
        for (key, value) in pairs {
            let file_name = key.trim_start_matches(&prefix).replace('/', "_");
            let path = dir.join(if file_name.is_empty() { "output".to_string() } else { file_name });
            let bytes = serde_json::to_vec_pretty(&value).map_err(|e| EngineError::Deserialize(e.to_string()))?;
            tokio::fs::write(path, bytes).await.map_err(|e| EngineError::Io(e.to_string()))?;
        }
        Ok(())
    }
}
