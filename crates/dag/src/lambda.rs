//! `Lambda` — the lazy data handle returned by every workflow-building call
//! (§3 GLOSSARY `Lambda`, §4.1).
//!
//! A `Lambda` is a cheap, `Clone`-able handle onto one data node inside the
//! workflow's [`Dag`](crate::model::Dag). Combinators (`map`, `fork`,
//! `join`, `index`/`project`, `+`) each allocate a new control node wired to
//! the handle's data node and return a fresh `Lambda` onto that control
//! node's output — never mutating the handle in place, since the original
//! Python's dynamic `__getattr__` method-fetch hook has no safe Rust
//! equivalent (Design Notes §9) and is replaced here by a closed set of
//! explicit methods plus the one operator overload (`+`) Rust's trait system
//! actually supports for this shape.

use std::sync::Arc;

use serde_json::Value;

use crate::error::DagError;
use crate::ids::DataNodeId;
use crate::model::{ControlKind, IndexKey, ParamKey};
use crate::workflow::Workflow;

/// A value or an in-flight `Lambda`, accepted wherever a workflow-building
/// call takes a parameter.
#[derive(Clone)]
pub enum Param {
    Lambda(Lambda),
    Value(Value),
}

impl From<Lambda> for Param {
    fn from(ld: Lambda) -> Self {
        Param::Lambda(ld)
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Value(Value::String(s.to_string()))
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Value(serde_json::json!(n))
    }
}

impl From<f64> for Param {
    fn from(n: f64) -> Self {
        Param::Value(serde_json::json!(n))
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Value(Value::Bool(b))
    }
}

#[derive(Clone)]
pub struct Lambda {
    pub(crate) workflow: Workflow,
    pub(crate) node: DataNodeId,
}

impl Lambda {
    pub(crate) fn new(workflow: Workflow, node: DataNodeId) -> Self {
        Self { workflow, node }
    }

    /// The data node this handle points at.
    pub fn node_id(&self) -> DataNodeId {
        self.node
    }

    /// The value currently bound to this handle, if the node has fired
    /// (only meaningful after `Workflow::execute` has run, or for literals).
    pub fn value(&self) -> Option<Value> {
        self.workflow.with_dag(|dag| dag.value_of(self.node).cloned())
    }

    /// Apply `f` to every element of this handle's array value
    /// (§4.1 `map`). `f` runs synchronously and locally — it cannot itself
    /// issue a stage `call`, matching the reference implementation where the
    /// mapped function is invoked as a plain local call per element.
    pub fn map(&self, f: impl Fn(Value) -> Result<Value, DagError> + Send + Sync + 'static) -> Lambda {
        self.workflow
            .push_unary(self.node, ControlKind::Map(Arc::new(f)))
    }

    /// Split this handle's array value into `ceil(len/n)` contiguous,
    /// size-balanced chunks (§4.1 `fork`).
    pub fn fork(&self, n: usize) -> Lambda {
        self.workflow.push_unary(self.node, ControlKind::ForkChunks(n))
    }

    /// Flatten one level of nesting out of this handle's value, then apply
    /// `f` to the flattened array (§4.1 `join`).
    pub fn join(&self, f: impl Fn(Value) -> Result<Value, DagError> + Send + Sync + 'static) -> Lambda {
        self.workflow
            .push_unary(self.node, ControlKind::JoinFlatten(Arc::new(f)))
    }

    /// Project a named field out of this handle's object value.
    pub fn project(&self, name: impl Into<String>) -> Lambda {
        self.index_key(IndexKey::Str(name.into()))
    }

    /// Project an element out of this handle's array value.
    pub fn index(&self, i: usize) -> Lambda {
        self.index_key(IndexKey::Int(i))
    }

    fn index_key(&self, key: IndexKey) -> Lambda {
        self.workflow.push_unary(self.node, ControlKind::Index(key))
    }
}

impl std::ops::Add for Lambda {
    type Output = Lambda;

    fn add(self, rhs: Lambda) -> Lambda {
        self.workflow.push_binary(
            ParamKey::Pos(0),
            self.node,
            ParamKey::Pos(1),
            rhs.node,
            ControlKind::Add,
        )
    }
}
