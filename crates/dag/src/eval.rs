//! The DAG evaluator — §4.1, `DAG.run()`.
//!
//! Single-threaded, cooperative, FIFO ready-queue firing: a data node that
//! becomes ready enqueues every control node it unblocks; a control node
//! that fires enqueues its one output data node. Firing order is therefore
//! a topological order of the graph discovered on the fly, not computed
//! ahead of time — nothing about the builder API can introduce a cycle, so
//! there is no separate acyclicity pre-check here (contrast
//! [`crate::topo::topological_sort`], used by the placement planner where
//! the graph *is* described declaratively and can be malformed).
//!
//! A `call()` control node blocks the evaluator on `invoker.call(...).await`
//! before the next item is dequeued — exactly the "blocking inside a
//! ControlNode suspends the evaluator sequentially" cooperative-scheduling
//! behaviour described in the design notes.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::error::DagError;
use crate::ids::{ControlNodeId, DataNodeId};
use crate::model::{ControlKind, Dag, IndexKey, ParamKey};

/// Dispatches a `call()` control node to whichever backend bound the
/// workflow. Implemented by the `backends` crate; kept as a trait here so
/// `dag` has no dependency on any concrete transport.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    async fn call(&self, stage: &str, params: Value) -> Result<Value, DagError>;
}

enum Task {
    Data(DataNodeId),
    Control(ControlNodeId),
}

/// Runs one DAG to completion and returns the value bound to its terminal
/// data node (the one named by `Workflow::end_with`).
pub struct Evaluator;

impl Evaluator {
    #[tracing::instrument(skip_all)]
    pub async fn run(
        dag: &mut Dag,
        terminal: DataNodeId,
        invoker: &dyn StageInvoker,
    ) -> Result<Value, DagError> {
        let mut queue: VecDeque<Task> = VecDeque::new();

        for id in dag.data_ids() {
            if dag.is_ready(id) {
                queue.push_back(Task::Data(id));
            }
        }
        for id in dag.control_ids() {
            if dag.control(id).inputs.is_empty() {
                queue.push_back(Task::Control(id));
            }
        }

        while let Some(task) = queue.pop_front() {
            match task {
                Task::Data(data_id) => {
                    let value = dag
                        .value_of(data_id)
                        .cloned()
                        .expect("a node only enters the queue once its value is set");
                    let consumers = dag.consumers_of(data_id).to_vec();
                    for ctrl_id in consumers {
                        let key = dag
                            .control(ctrl_id)
                            .inputs
                            .iter()
                            .find(|(_, d)| *d == data_id)
                            .map(|(k, _)| k.clone())
                            .expect("consumer always declared this data node as an input");
                        if dag.bind_input(ctrl_id, key, value.clone()) {
                            queue.push_back(Task::Control(ctrl_id));
                        }
                    }
                }
                Task::Control(ctrl_id) => {
                    let output_value = Self::fire(dag, ctrl_id, invoker).await?;
                    let out_id = dag.output_of(ctrl_id);
                    tracing::trace!(?out_id, "control node fired");
                    dag.set_value(out_id, output_value);
                    queue.push_back(Task::Data(out_id));
                }
            }
        }

        dag.value_of(terminal)
            .cloned()
            .ok_or_else(|| DagError::MissingInput("terminal data node never fired".to_string()))
    }

    async fn fire(
        dag: &Dag,
        ctrl_id: ControlNodeId,
        invoker: &dyn StageInvoker,
    ) -> Result<Value, DagError> {
        let bound = dag.bound_map_of(ctrl_id);
        match dag.kind_of(ctrl_id) {
            ControlKind::Call { stage } => invoker.call(stage, named_params(bound)).await,
            ControlKind::Func(f) => f(bound),
            ControlKind::Map(f) => {
                let items = single_input(bound)?.as_array().cloned().ok_or_else(|| {
                    DagError::Combinator("map: input value is not an array".into())
                })?;
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(f(item)?);
                }
                Ok(Value::Array(results))
            }
            ControlKind::ForkChunks(n) => {
                let items = single_input(bound)?.as_array().cloned().ok_or_else(|| {
                    DagError::Combinator("fork: input value is not an array".into())
                })?;
                Ok(Value::Array(
                    fork_chunks(&items, *n)?.into_iter().map(Value::Array).collect(),
                ))
            }
            ControlKind::JoinFlatten(f) => {
                let chunks = single_input(bound)?.as_array().cloned().ok_or_else(|| {
                    DagError::Combinator("join: input value is not an array".into())
                })?;
                let mut flattened = Vec::new();
                for chunk in chunks {
                    let inner = chunk.as_array().ok_or_else(|| {
                        DagError::Combinator("join: chunk is not an array".into())
                    })?;
                    flattened.extend(inner.iter().cloned());
                }
                f(Value::Array(flattened))
            }
            ControlKind::Index(key) => index_value(&single_input(bound)?, key),
            ControlKind::Add => {
                let lhs = bound
                    .get(&ParamKey::Pos(0))
                    .ok_or_else(|| DagError::MissingInput("lhs".into()))?;
                let rhs = bound
                    .get(&ParamKey::Pos(1))
                    .ok_or_else(|| DagError::MissingInput("rhs".into()))?;
                add_values(lhs, rhs)
            }
        }
    }
}

fn single_input(bound: &std::collections::BTreeMap<ParamKey, Value>) -> Result<Value, DagError> {
    bound
        .get(&ParamKey::Pos(0))
        .cloned()
        .ok_or_else(|| DagError::MissingInput("combinator input".into()))
}

fn named_params(bound: &std::collections::BTreeMap<ParamKey, Value>) -> Value {
    let mut obj = serde_json::Map::new();
    for (key, value) in bound {
        if let ParamKey::Named(name) = key {
            obj.insert(name.clone(), value.clone());
        }
    }
    Value::Object(obj)
}

/// Split `items` into `ceil(len/n)` contiguous, size-balanced chunks (§4.1
/// `fork`). The first `len % chunk_count` chunks get one extra element.
fn fork_chunks(items: &[Value], n: usize) -> Result<Vec<Vec<Value>>, DagError> {
    if n == 0 {
        return Err(DagError::Combinator("fork: n must be greater than zero".into()));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let len = items.len();
    let chunk_count = len.div_ceil(n);
    let base = len / chunk_count;
    let remainder = len % chunk_count;

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut offset = 0;
    for i in 0..chunk_count {
        let size = if i < remainder { base + 1 } else { base };
        chunks.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    Ok(chunks)
}

fn index_value(value: &Value, key: &IndexKey) -> Result<Value, DagError> {
    match key {
        IndexKey::Str(name) => value
            .get(name)
            .cloned()
            .ok_or_else(|| DagError::Combinator(format!("no field '{name}' in {value}"))),
        IndexKey::Int(i) => value
            .get(i)
            .cloned()
            .ok_or_else(|| DagError::Combinator(format!("index {i} out of range in {value}"))),
    }
}

fn add_values(lhs: &Value, rhs: &Value) -> Result<Value, DagError> {
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        return Ok(Value::Number(Number::from(a + b)));
    }
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return Number::from_f64(a + b)
            .map(Value::Number)
            .ok_or_else(|| DagError::Combinator("add: result is not a finite number".into()));
    }
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        return Ok(Value::String(format!("{a}{b}")));
    }
    Err(DagError::Combinator(format!("cannot add {lhs} and {rhs}")))
}

#[cfg(test)]
mod tests {
    use super::fork_chunks;
    use serde_json::json;

    #[test]
    fn fork_splits_into_ceil_len_over_n_balanced_chunks() {
        let items: Vec<_> = (0..7).map(|i| json!(i)).collect();
        let chunks = fork_chunks(&items, 3).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 7);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[1].len(), 2);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn fork_of_empty_input_yields_no_chunks() {
        assert!(fork_chunks(&[], 4).unwrap().is_empty());
    }

    #[test]
    fn fork_rejects_zero_n() {
        assert!(fork_chunks(&[json!(1)], 0).is_err());
    }
}
