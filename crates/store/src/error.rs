//! Typed error type for the `store` crate.

use thiserror::Error;

/// Errors produced by a [`crate::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is down or unreachable. §7 *StoreUnavailable* —
    /// retried inside the client; callers that exhaust their own retries
    /// should surface this upward as *TransientTransport*.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value round-tripped through the store failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis client/transport error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
