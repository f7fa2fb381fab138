//! Worker-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("stage error: {0}")]
    Stage(#[from] stage::StageError),

    #[error("route error: {0}")]
    Route(#[from] stage::RouteError),

    #[error("malformed wire request: {0}")]
    MalformedRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
