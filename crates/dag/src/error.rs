//! DAG and placement error types.

use thiserror::Error;

/// Errors produced while building, validating, or evaluating a DAG.
#[derive(Debug, Error, Clone)]
pub enum DagError {
    /// A `ControlNode` fired with a parameter slot still unbound.
    #[error("control node fired with missing input '{0}'")]
    MissingInput(String),

    /// The generic topological check found a back-edge.
    #[error("graph contains a cycle")]
    CycleDetected,

    /// `getEvent().get(key)` was read but neither the triggering event nor a
    /// default supplied a value.
    #[error("missing workflow parameter '{0}'")]
    MissingParameter(String),

    /// A stage invocation returned a fatal or retryable failure that the
    /// evaluator does not retry itself (retries are a controller/worker
    /// concern, §4.4/§4.5 — the evaluator surfaces the failure as-is).
    #[error("stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// A pure `func`/`map`/`join`/`index`/`add` combinator's body returned an
    /// error or the value shapes were incompatible with the operator
    /// (e.g. `+` on two non-numeric values).
    #[error("combinator error: {0}")]
    Combinator(String),
}

/// Errors produced by the placement planner (§4.7, "Ditto").
#[derive(Debug, Error, Clone)]
pub enum PlannerError {
    /// No merge of the dependency graph fits within any worker's declared
    /// vCPU capacity.
    #[error("no feasible placement: {0}")]
    Infeasible(String),

    /// The stage dependency graph handed to the planner contains a cycle.
    #[error("stage dependency graph contains a cycle")]
    CycleDetected,

    /// An edge in the dependency graph names a stage the planner was never
    /// told about.
    #[error("dependency graph references unknown stage '{0}'")]
    UnknownStage(String),
}
