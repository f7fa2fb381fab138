//! Durable-runtime error type.

use thiserror::Error;

/// Errors produced by [`crate::runtime::DurableRuntime`].
///
/// `Suspend` is not a failure — §4.8 describes it as a signal an outer
/// handler catches to checkpoint and return a `WaitingResult` handle
/// instead of a value. It is still modeled as an `Err` variant (Design
/// Notes §9: no exceptions-as-control-flow in a systems target) so the
/// orchestrator body can propagate it with a plain `?` and the driver in
/// [`crate::runtime::DurableRuntime::step`] is the only place that inspects it.
#[derive(Debug, Error, Clone)]
pub enum DurableError {
    /// The awaited call/tell did not complete within its synchronous
    /// budget; the orchestrator must stop here and resume later.
    #[error("suspended awaiting action {0}")]
    Suspend(usize),

    /// The underlying backend's call/tell failed outright.
    #[error("backend call failed: {0}")]
    Backend(String),

    /// The persisted action log could not be read back from the Store.
    #[error("corrupt action log: {0}")]
    CorruptLog(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<store::StoreError> for DurableError {
    fn from(err: store::StoreError) -> Self {
        DurableError::Store(err.to_string())
    }
}
