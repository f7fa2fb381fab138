//! `dag` crate — the DAG-building front end, its evaluator, and the
//! placement planner.
//!
//! [`Workflow`] is the builder user code calls (`call`, `func`, `get_event`,
//! `end_with`); [`Lambda`] is the lazy handle every builder call returns;
//! [`Evaluator`] fires the resulting graph to completion once `execute` is
//! invoked. [`planner`] is a separate concern — it operates on a
//! declarative stage dependency graph, not on the Lambda/DataNode graph,
//! and is consumed by the `controller` crate when planning where each
//! stage runs.

pub mod error;
pub mod eval;
pub mod ids;
pub mod lambda;
pub mod model;
pub mod planner;
pub mod topo;
pub mod workflow;

pub use error::{DagError, PlannerError};
pub use eval::{Evaluator, StageInvoker};
pub use ids::{ControlNodeId, DataNodeId};
pub use lambda::{Lambda, Param};
pub use model::{ControlKind, IndexKey, ParamKey};
pub use planner::{DittoPlacer, NodeResources, StageProfile};
pub use workflow::{Workflow, WorkflowInput};

#[cfg(test)]
mod integration_tests;
