//! `Workflow` — the builder that accumulates calls into a [`Dag`] and then
//! runs it (§3 GLOSSARY `Workflow`, §4.1).
//!
//! Shared via `Arc<Mutex<..>>` rather than `Rc<RefCell<..>>` so a `Workflow`
//! (and every `Lambda` handle onto it) is `Send`: stage calls made during
//! `execute` are asynchronous network I/O, and the lock is never held
//! across an `.await` — `execute` swaps the arena out with
//! `mem::take` before awaiting the evaluator and swaps it back after,
//! which the compiler enforces since `MutexGuard` is itself `!Send`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::DagError;
use crate::eval::{Evaluator, StageInvoker};
use crate::ids::DataNodeId;
use crate::lambda::{Lambda, Param};
use crate::model::{ControlKind, Dag, ParamKey};

struct WorkflowInner {
    dag: Dag,
    params: BTreeMap<String, DataNodeId>,
    terminal: Option<DataNodeId>,
}

/// A cheap, clonable handle onto a workflow under construction.
#[derive(Clone)]
pub struct Workflow(Arc<Mutex<WorkflowInner>>);

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Workflow(Arc::new(Mutex::new(WorkflowInner {
            dag: Dag::new(),
            params: BTreeMap::new(),
            terminal: None,
        })))
    }

    /// Accessor for the triggering event's fields (§3 GLOSSARY `WorkflowInput`).
    pub fn get_event(&self) -> WorkflowInput {
        WorkflowInput { workflow: self.clone() }
    }

    /// Invoke `stage` by name through the route table the active backend
    /// bound to this workflow. Every parameter is keyed by name.
    pub fn call(&self, stage: impl Into<String>, params: Vec<(&str, Param)>) -> Lambda {
        let inputs: Vec<(ParamKey, DataNodeId)> = params
            .into_iter()
            .map(|(k, p)| (ParamKey::Named(k.to_string()), self.resolve_param(p)))
            .collect();
        let (_, out) = self
            .0
            .lock()
            .unwrap()
            .dag
            .alloc_control_node(ControlKind::Call { stage: stage.into() }, inputs);
        Lambda::new(self.clone(), out)
    }

    /// Apply a pure local function to positional `args` and keyword
    /// `kwargs` (§3 GLOSSARY `func`) — the local-execution counterpart of
    /// `call`, never dispatched through a backend.
    pub fn func(
        &self,
        f: impl Fn(&BTreeMap<ParamKey, Value>) -> Result<Value, DagError> + Send + Sync + 'static,
        args: Vec<Param>,
        kwargs: Vec<(&str, Param)>,
    ) -> Lambda {
        let mut inputs = Vec::with_capacity(args.len() + kwargs.len());
        for (i, p) in args.into_iter().enumerate() {
            inputs.push((ParamKey::Pos(i), self.resolve_param(p)));
        }
        for (k, p) in kwargs {
            inputs.push((ParamKey::Named(k.to_string()), self.resolve_param(p)));
        }
        let (_, out) = self
            .0
            .lock()
            .unwrap()
            .dag
            .alloc_control_node(ControlKind::Func(Arc::new(f)), inputs);
        Lambda::new(self.clone(), out)
    }

    /// Mark `ld` as the value this workflow produces (§3 GLOSSARY `end_with`).
    pub fn end_with(&self, ld: impl Into<Param>) {
        let node = self.resolve_param(ld.into());
        let mut inner = self.0.lock().unwrap();
        inner.dag.mark_terminal(node);
        inner.terminal = Some(node);
    }

    /// Seed workflow parameters from the triggering event, then run the DAG
    /// to completion, returning the terminal value.
    ///
    /// # Errors
    /// [`DagError::MissingParameter`] if a parameter read via `get_event`
    /// has neither a matching field in `event` nor a default; any error
    /// surfaced by a control node while firing.
    pub async fn execute(
        &self,
        event: Value,
        invoker: &dyn StageInvoker,
    ) -> Result<Value, DagError> {
        let param_ids: Vec<(String, DataNodeId)> = {
            let inner = self.0.lock().unwrap();
            inner.params.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };

        {
            let mut inner = self.0.lock().unwrap();
            for (key, node) in &param_ids {
                match event.get(key) {
                    Some(v) => inner.dag.set_value(*node, v.clone()),
                    None if inner.dag.is_ready(*node) => {}
                    None => return Err(DagError::MissingParameter(key.clone())),
                }
            }
        }

        let terminal = {
            let inner = self.0.lock().unwrap();
            inner
                .terminal
                .ok_or_else(|| DagError::MissingInput("end_with was never called".into()))?
        };

        let mut dag = {
            let mut inner = self.0.lock().unwrap();
            std::mem::take(&mut inner.dag)
        };

        let result = Evaluator::run(&mut dag, terminal, invoker).await;

        self.0.lock().unwrap().dag = dag;
        result
    }

    pub(crate) fn with_dag<T>(&self, f: impl FnOnce(&Dag) -> T) -> T {
        f(&self.0.lock().unwrap().dag)
    }

    pub(crate) fn push_unary(&self, input: DataNodeId, kind: ControlKind) -> Lambda {
        let (_, out) = self
            .0
            .lock()
            .unwrap()
            .dag
            .alloc_control_node(kind, vec![(ParamKey::Pos(0), input)]);
        Lambda::new(self.clone(), out)
    }

    pub(crate) fn push_binary(
        &self,
        k1: ParamKey,
        n1: DataNodeId,
        k2: ParamKey,
        n2: DataNodeId,
        kind: ControlKind,
    ) -> Lambda {
        let (_, out) = self.0.lock().unwrap().dag.alloc_control_node(kind, vec![(k1, n1), (k2, n2)]);
        Lambda::new(self.clone(), out)
    }

    fn resolve_param(&self, p: Param) -> DataNodeId {
        match p {
            Param::Lambda(ld) => ld.node_id(),
            Param::Value(v) => self.0.lock().unwrap().dag.alloc_ready_data_node(v),
        }
    }
}

/// Reads fields off the event that triggered this workflow.
pub struct WorkflowInput {
    workflow: Workflow,
}

impl WorkflowInput {
    /// Get (or declare, on first call) the parameter named `key`.
    ///
    /// Each distinct `key` maps to exactly one data node for the life of
    /// the workflow — calling `get` again with the same key returns a
    /// handle onto the same node rather than allocating a second one.
    pub fn get(&self, key: &str, default: Option<Value>) -> Lambda {
        let mut inner = self.workflow.0.lock().unwrap();
        if let Some(&id) = inner.params.get(key) {
            drop(inner);
            return Lambda::new(self.workflow.clone(), id);
        }
        let id = match default {
            Some(v) => inner.dag.alloc_ready_data_node(v),
            None => inner.dag.alloc_data_node(),
        };
        inner.params.insert(key.to_string(), id);
        drop(inner);
        Lambda::new(self.workflow.clone(), id)
    }
}
