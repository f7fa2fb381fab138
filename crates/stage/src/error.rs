//! Stage-level error type.

use thiserror::Error;

/// Errors returned by a stage's `invoke` method, or by its storage handle.
///
/// The caller (worker, controller, or local-once backend) uses the variant
/// to decide retry behaviour:
/// - `Retryable` — the invocation should be retried under the caller's
///   failure-tolerance policy.
/// - `Fatal`     — the invocation must not be retried.
/// - `MissingEntry` — a `get_existed_object` read came back empty.
#[derive(Debug, Error, Clone)]
pub enum StageError {
    /// Transient failure; the caller should retry.
    #[error("retryable stage error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal stage error: {0}")]
    Fatal(String),

    /// `get_existed_object` found the key but the stored value was empty.
    #[error("missing entry for key '{0}'")]
    MissingEntry(String),
}
