//! `MockStage` — a test double for [`Stage`].
//!
//! Useful in unit and integration tests where a real stage implementation is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::{Stage, StageContext, StageError};

/// Behaviour injected into `MockStage` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail the first `n` calls retryably, then succeed with `value`.
    FailThenSucceed { remaining: Arc<Mutex<u32>>, value: Value },
}

/// A mock stage that records every call it receives and returns a
/// programmer-specified result.
pub struct MockStage {
    /// Label used in test assertions.
    pub name: String,
    /// What the stage will do when `invoke` is called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by this stage (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockStage {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that fails the first `fail_count` invocations with a
    /// retryable error, then succeeds with `value` forever after.
    pub fn failing_n_then_succeeding(name: impl Into<String>, fail_count: u32, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailThenSucceed {
                remaining: Arc::new(Mutex::new(fail_count)),
                value,
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this stage has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn invoke(&self, params: Value, _ctx: &StageContext) -> Result<Value, StageError> {
        self.calls.lock().unwrap().push(params.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(merge_tagged(&self.name, v)),
            MockBehaviour::FailRetryable(msg) => Err(StageError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(StageError::Fatal(msg.clone())),
            MockBehaviour::FailThenSucceed { remaining, value } => {
                let mut left = remaining.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    Err(StageError::Retryable(format!(
                        "{} scheduled failure ({} remaining)",
                        self.name, *left
                    )))
                } else {
                    Ok(merge_tagged(&self.name, value))
                }
            }
        }
    }
}

/// Merge `value`'s object fields into `{"stage": name}`, so tests can trace
/// which mock produced which output.
fn merge_tagged(name: &str, value: &Value) -> Value {
    let mut out = json!({ "stage": name });
    if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), value.as_object()) {
        for (k, val) in v_obj {
            out_obj.insert(k.clone(), val.clone());
        }
    }
    out
}
