//! Arena index types.
//!
//! The DAG is modelled as one arena (`Dag`) owning `Vec<DataNodeSlot>` and
//! `Vec<ControlNodeSlot>`; every cross-reference between nodes is a plain
//! index rather than a pointer or `Rc` back-reference, so the graph never
//! needs interior-mutable cycles to express "data node points at its
//! successor control nodes, control node points back at its data inputs"
//! (Design Notes §9). Indices are valid for the lifetime of the owning
//! `Dag` and are meaningless across different `Dag` instances.

/// Index of a [`crate::model::DataNodeSlot`] within its owning [`crate::model::Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNodeId(pub(crate) usize);

/// Index of a [`crate::model::ControlNodeSlot`] within its owning [`crate::model::Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlNodeId(pub(crate) usize);
