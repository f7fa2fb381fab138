//! Backend-level error type — the union every [`crate::Backend`]
//! implementation's `call`/`tell` can fail with.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage failed: {0}")]
    StageFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{provider} is not a recognized provider")]
    UnknownProvider { provider: String },
}

impl From<stage::StageError> for BackendError {
    fn from(err: stage::StageError) -> Self {
        BackendError::StageFailed(err.to_string())
    }
}

impl From<stage::RouteError> for BackendError {
    fn from(err: stage::RouteError) -> Self {
        match err {
            stage::RouteError::UnknownStage(name) => BackendError::UnknownStage(name),
            other => BackendError::StageFailed(other.to_string()),
        }
    }
}

impl From<store::StoreError> for BackendError {
    fn from(err: store::StoreError) -> Self {
        BackendError::Transport(err.to_string())
    }
}

impl From<controller::EngineError> for BackendError {
    fn from(err: controller::EngineError) -> Self {
        BackendError::Transport(err.to_string())
    }
}

impl From<controller::InvokeError> for BackendError {
    fn from(err: controller::InvokeError) -> Self {
        BackendError::Transport(err.to_string())
    }
}

impl From<BackendError> for dag::DagError {
    fn from(err: BackendError) -> Self {
        dag::DagError::Combinator(err.to_string())
    }
}

impl From<BackendError> for durable::DurableError {
    fn from(err: BackendError) -> Self {
        durable::DurableError::Backend(err.to_string())
    }
}
