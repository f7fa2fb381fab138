//! The DAG arena: `DataNodeSlot`, `ControlNodeSlot`, and the `Dag` that owns
//! them (§4.1 "DAG Evaluator").
//!
//! A `DataNode` is a lazy placeholder for a value; a `ControlNode` is a pure
//! computation (or a stage invocation) that fires once every one of its
//! inputs is bound and produces exactly one outbound `DataNode`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::DagError;
use crate::ids::{ControlNodeId, DataNodeId};

/// Ordered key under which a `ControlNode` expects one of its inputs.
///
/// `func(fn, *args, **kwargs)` (§3 GLOSSARY `func`) binds positional
/// arguments by index and keyword arguments by name; `call(stage, params)`
/// binds every input by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKey {
    Pos(usize),
    Named(String),
}

/// What a `ControlNode` does once every input is bound.
pub enum ControlKind {
    /// Invoke a stage by name through the active backend (`workflow.call`).
    Call { stage: String },
    /// Apply a pure function to the ordered/keyed argument map (`workflow.func`).
    Func(Arc<dyn Fn(&BTreeMap<ParamKey, Value>) -> Result<Value, DagError> + Send + Sync>),
    /// `Lambda::map` — apply a pure function to each element of a JSON array.
    Map(Arc<dyn Fn(Value) -> Result<Value, DagError> + Send + Sync>),
    /// `Lambda::fork` — split a JSON array into `n` contiguous, balanced chunks.
    ForkChunks(usize),
    /// `Lambda::join` — flatten one level of nesting, then apply `fn`.
    JoinFlatten(Arc<dyn Fn(Value) -> Result<Value, DagError> + Send + Sync>),
    /// `Lambda::index` / `Lambda::project` — project a field or element out
    /// of a JSON object or array.
    Index(IndexKey),
    /// `Lambda + Lambda` — numeric addition.
    Add,
}

/// Key used by the `index`/`project` combinator.
#[derive(Debug, Clone)]
pub enum IndexKey {
    Str(String),
    Int(usize),
}

/// A placeholder for a value that becomes ready exactly once.
pub struct DataNodeSlot {
    pub value: Option<Value>,
    /// The control node that produces this data node's value, if any
    /// (absent for workflow parameters and literals, which are seeded
    /// directly).
    pub producer: Option<ControlNodeId>,
    /// Control nodes that consume this data node as one of their inputs.
    pub consumers: Vec<ControlNodeId>,
    pub terminal: bool,
}

impl DataNodeSlot {
    fn empty() -> Self {
        Self { value: None, producer: None, consumers: Vec::new(), terminal: false }
    }

    fn ready(&self) -> bool {
        self.value.is_some()
    }
}

/// A pure computation (or stage call) bound to zero or more ordered inputs
/// and exactly one output.
pub struct ControlNodeSlot {
    pub kind: ControlKind,
    /// Inputs this node is waiting on, in the order they were declared.
    pub inputs: Vec<(ParamKey, DataNodeId)>,
    /// Values bound so far; the node fires once this has one entry per
    /// `inputs` slot.
    pub bound: BTreeMap<ParamKey, Value>,
    pub output: DataNodeId,
}

/// Arena owning every data node and control node in a workflow.
///
/// Built incrementally by [`crate::workflow::Workflow`]; evaluated by
/// [`crate::eval::Evaluator`].
#[derive(Default)]
pub struct Dag {
    data_nodes: Vec<DataNodeSlot>,
    control_nodes: Vec<ControlNodeSlot>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an unready data node.
    pub fn alloc_data_node(&mut self) -> DataNodeId {
        self.data_nodes.push(DataNodeSlot::empty());
        DataNodeId(self.data_nodes.len() - 1)
    }

    /// Allocate a data node that is already ready (a literal or a seeded
    /// workflow parameter).
    pub fn alloc_ready_data_node(&mut self, value: Value) -> DataNodeId {
        let id = self.alloc_data_node();
        self.data_nodes[id.0].value = Some(value);
        id
    }

    /// Allocate a control node bound to `inputs`, wiring up the
    /// producer/consumer back-references on both sides.
    pub fn alloc_control_node(
        &mut self,
        kind: ControlKind,
        inputs: Vec<(ParamKey, DataNodeId)>,
    ) -> (ControlNodeId, DataNodeId) {
        let output = self.alloc_data_node();
        self.control_nodes.push(ControlNodeSlot {
            kind,
            inputs: inputs.clone(),
            bound: BTreeMap::new(),
            output,
        });
        let ctrl_id = ControlNodeId(self.control_nodes.len() - 1);

        for (_, data_id) in &inputs {
            self.data_nodes[data_id.0].consumers.push(ctrl_id);
        }
        self.data_nodes[output.0].producer = Some(ctrl_id);

        (ctrl_id, output)
    }

    pub fn mark_terminal(&mut self, node: DataNodeId) {
        self.data_nodes[node.0].terminal = true;
    }

    pub fn data(&self, id: DataNodeId) -> &DataNodeSlot {
        &self.data_nodes[id.0]
    }

    pub fn control(&self, id: ControlNodeId) -> &ControlNodeSlot {
        &self.control_nodes[id.0]
    }

    pub fn data_ids(&self) -> impl Iterator<Item = DataNodeId> {
        (0..self.data_nodes.len()).map(DataNodeId)
    }

    pub fn control_ids(&self) -> impl Iterator<Item = ControlNodeId> {
        (0..self.control_nodes.len()).map(ControlNodeId)
    }

    /// Set a data node's value, marking it ready.
    pub(crate) fn set_value(&mut self, id: DataNodeId, value: Value) {
        self.data_nodes[id.0].value = Some(value);
    }

    /// Bind one input of a control node; returns `true` once every input is
    /// bound (the node is ready to fire).
    pub(crate) fn bind_input(&mut self, ctrl: ControlNodeId, key: ParamKey, value: Value) -> bool {
        let slot = &mut self.control_nodes[ctrl.0];
        slot.bound.insert(key, value);
        slot.bound.len() == slot.inputs.len()
    }

    pub(crate) fn consumers_of(&self, data: DataNodeId) -> &[ControlNodeId] {
        &self.data_nodes[data.0].consumers
    }

    pub(crate) fn is_ready(&self, data: DataNodeId) -> bool {
        self.data_nodes[data.0].ready()
    }

    pub(crate) fn value_of(&self, data: DataNodeId) -> Option<&Value> {
        self.data_nodes[data.0].value.as_ref()
    }

    pub(crate) fn output_of(&self, ctrl: ControlNodeId) -> DataNodeId {
        self.control_nodes[ctrl.0].output
    }

    pub(crate) fn kind_of(&self, ctrl: ControlNodeId) -> &ControlKind {
        &self.control_nodes[ctrl.0].kind
    }

    pub(crate) fn bound_map_of(&self, ctrl: ControlNodeId) -> &BTreeMap<ParamKey, Value> {
        &self.control_nodes[ctrl.0].bound
    }
}
