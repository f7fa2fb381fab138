//! `DurableActionLog` (§3) — the ordered, persisted record of `call`/`tell`
//! actions an orchestrator has issued, keyed by program counter.
//!
//! Grounded on the checkpoint shape implied by §4.8: on replay, actions
//! `0..k-1` are `Completed` and supply cached results; the k-th is the
//! suspension point. Persisted verbatim as JSON under
//! `orchestrator::__state__::{instanceId}` (`store::keys::orchestrator_state`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of backend call an [`Action`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Call,
    Tell,
}

/// One action's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Completed,
    Failed,
}

/// One entry in a [`DurableActionLog`] (§3 "DurableActionLog").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub pc: usize,
    pub kind: ActionKind,
    pub target: String,
    pub params: Value,
    pub status: ActionStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

impl Action {
    pub fn pending(pc: usize, kind: ActionKind, target: impl Into<String>, params: Value) -> Self {
        Self { pc, kind, target: target.into(), params, status: ActionStatus::Pending, result: None }
    }
}

/// The full persisted log for one orchestrator instance (§3, §4.8
/// "Suspension point invariant").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurableActionLog {
    pub actions: Vec<Action>,
    /// The next program counter to allocate; always `actions.len()` except
    /// transiently while a suspended action is still `Pending` at the head.
    pub taskpc: usize,
}

impl DurableActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action recorded at `pc`, if replay has reached that far yet.
    pub fn at(&self, pc: usize) -> Option<&Action> {
        self.actions.get(pc)
    }

    /// Append a fresh `Pending` action and bump `taskpc` (§3 "taskpc").
    pub fn push(&mut self, kind: ActionKind, target: impl Into<String>, params: Value) -> usize {
        let pc = self.actions.len();
        self.actions.push(Action::pending(pc, kind, target, params));
        self.taskpc = self.actions.len();
        pc
    }

    /// Mark the action at `pc` `Completed` with `result` (§3 "the k-th is
    /// the suspension point" — resolved once its result arrives).
    pub fn complete(&mut self, pc: usize, result: Value) {
        if let Some(action) = self.actions.get_mut(pc) {
            action.status = ActionStatus::Completed;
            action.result = Some(result);
        }
    }

    pub fn fail(&mut self, pc: usize) {
        if let Some(action) = self.actions.get_mut(pc) {
            action.status = ActionStatus::Failed;
        }
    }

    /// True once every recorded action is `Completed` — the terminal state
    /// the durable-idempotence property (§8) checks against.
    pub fn all_completed(&self) -> bool {
        !self.actions.is_empty() && self.actions.iter().all(|a| a.status == ActionStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_complete_marks_the_right_entry() {
        let mut log = DurableActionLog::new();
        let pc = log.push(ActionKind::Call, "add", json!({"a": 1}));
        assert_eq!(pc, 0);
        assert_eq!(log.taskpc, 1);
        log.complete(pc, json!({"res": 2}));
        assert_eq!(log.actions[0].status, ActionStatus::Completed);
        assert_eq!(log.actions[0].result, Some(json!({"res": 2})));
    }

    #[test]
    fn round_trips_through_json() {
        let mut log = DurableActionLog::new();
        log.push(ActionKind::Tell, "notify", Value::Null);
        let encoded = serde_json::to_string(&log).unwrap();
        let decoded: DurableActionLog = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.actions.len(), 1);
        assert_eq!(decoded.taskpc, 1);
    }
}
