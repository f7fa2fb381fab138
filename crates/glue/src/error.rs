//! `GlueError` — what the handler factory (§6 "Glue") can fail with.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GlueError {
    /// `FAASIT_PROVIDER` named something outside
    /// `{local, local-once, aliyun, knative, aws, pku}` (§6, §7). Fatal at
    /// construction — never surfaced mid-execution.
    #[error("'{0}' is not a recognized FAASIT_PROVIDER")]
    UnknownProvider(String),

    #[error("missing or malformed environment configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Dag(#[from] dag::DagError),

    #[error(transparent)]
    Durable(#[from] durable::DurableError),

    #[error(transparent)]
    Backend(#[from] backends::BackendError),
}
