//! Controller error types (§7 error taxonomy, the controller's slice of it).

use thiserror::Error;

/// Errors surfaced by [`crate::invoke::Invoker`] implementations.
///
/// A `TransientTransport` here is always the *last* failure of a retry
/// loop that already exhausted its own wall-clock budget — by the time an
/// engine sees this, backing off further would not help.
#[derive(Debug, Error, Clone)]
pub enum InvokeError {
    #[error("transient transport error: {0}")]
    Transient(String),
}

/// Errors produced while running one instance's [`crate::engine::Engine`]
/// loop. None of these are meant to unwind past [`crate::engine::Engine::run`]
/// in the ordinary case — a dispatch or poll failure is recorded as a stage
/// failure against `failure_tolerance` (§4.4) rather than returned, so a
/// caller only ever sees one of these for a setup-time mistake (an unknown
/// stage named in `dependencies`) or an unrecoverable store outage.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown stage '{0}' has no entry in the placement schedule")]
    UnknownStage(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("stage outcome did not deserialize: {0}")]
    Deserialize(String),

    #[error("io error writing final outputs: {0}")]
    Io(String),
}

/// Errors produced while rendering or loading a deployment profile.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("profile file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("profile names unknown stage '{0}' in its DAG section")]
    UnknownStage(String),

    #[error(transparent)]
    Planner(#[from] dag::PlannerError),
}
