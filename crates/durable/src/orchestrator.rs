//! `OrchestratorMetadata` (§3) and the `WaitingResult` registry completion
//! propagates through (§4.8 "Completion propagates by posting to a
//! WaitingResult queue keyed by orchestrator id").

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Identity and immutable inputs of one durable orchestrator instance
/// (§3). `id` is the stable key every Store lookup and `WaitingResult`
/// registration is keyed by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorMetadata {
    pub id: String,
    pub input: Value,
    #[serde(default)]
    pub caller_metadata: Option<Value>,
}

impl OrchestratorMetadata {
    pub fn new(id: impl Into<String>, input: Value, caller_metadata: Option<Value>) -> Self {
        Self { id: id.into(), input, caller_metadata }
    }
}

/// A handle returned to a caller whose orchestrator suspended mid-run
/// instead of producing a value (§4.8).
#[derive(Debug, Clone)]
pub struct WaitingResult {
    pub instance_id: String,
}

/// Registry matching an orchestrator instance id to the exactly-one
/// waiter currently blocked on its completion.
///
/// Grounded on the "any caller awaiting that id receives the result
/// exactly once" wording in §4.8 — a `oneshot` channel is the natural
/// Rust shape for "exactly once, at most one waiter".
#[derive(Default)]
pub struct WaitingResultRegistry {
    waiters: Mutex<HashMap<String, oneshot::Sender<Value>>>,
}

impl WaitingResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `instance_id`'s eventual result.
    pub fn wait(&self, instance_id: impl Into<String>) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(instance_id.into(), tx);
        rx
    }

    /// Deliver `value` to whoever is waiting on `instance_id`, if anyone.
    /// A no-op if nobody registered (the resume arrived before any caller
    /// started waiting, or the waiter already gave up).
    pub fn complete(&self, instance_id: &str, value: Value) {
        if let Some(tx) = self.waiters.lock().remove(instance_id) {
            let _ = tx.send(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn a_waiter_receives_the_value_posted_after_it_registered() {
        let registry = WaitingResultRegistry::new();
        let rx = registry.wait("inst-1");
        registry.complete("inst-1", json!({"res": 1}));
        assert_eq!(rx.await.unwrap(), json!({"res": 1}));
    }

    #[test]
    fn completing_an_unregistered_id_is_a_no_op() {
        let registry = WaitingResultRegistry::new();
        registry.complete("ghost", json!(1));
    }
}
