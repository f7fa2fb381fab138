//! `StageInvocation` (§3 "StageInvocation (Metadata)") — the per-try record
//! the controller constructs and ships to a worker over the wire, and the
//! worker writes an outcome for back into the shared `Store`.
//!
//! Grounded on `metadata.py`'s `Metadata`: the controller mints `id` once
//! per stage per engine and a fresh `unique_execution_id` per retry
//! (`remote_call`), the worker never replies with the result inline — it
//! polls `{unique_execution_id}-result` instead (§4.4, §4.5).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One worker endpoint (§3 `Address`): the HTTP port and the TCP cache-server
/// port, both bound to the same node IP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub cache_port: u16,
}

/// Inter-stage transport policy (§3 `TransportMode`, §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportMode {
    AllRedis,
    AllTcp,
    Auto,
}

/// What a worker found when it actually ran the stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageOutcome {
    Ok(Value),
    Err { exception: String, traceback: String },
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok(_))
    }
}

/// A per-try record describing one attempt to invoke a stage (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInvocation {
    pub execution_namespace: String,
    pub stage: String,
    pub schedule: HashMap<String, Address>,
    pub trans_mode: TransportMode,
    pub params: Value,
    pub remote_call_timeout: f64,
    pub post_ratio: f64,

    /// Identifies this series of tries of the same stage launched by the
    /// same engine; stable across retries.
    pub id: String,
    /// Identifies one specific try; changes every `remote_call`.
    pub unique_execution_id: String,
    pub call_cnt: u32,
    pub call_time: f64,
    pub finish_time: f64,
}

impl StageInvocation {
    /// Construct a fresh invocation record for one stage within one engine
    /// (§3 "created per stage per engine"). `call_cnt` starts at zero;
    /// call [`StageInvocation::remote_call`] before dispatching the first
    /// try.
    pub fn new(
        execution_namespace: impl Into<String>,
        stage: impl Into<String>,
        schedule: HashMap<String, Address>,
        trans_mode: TransportMode,
        params: Value,
        remote_call_timeout: f64,
        post_ratio: f64,
    ) -> Self {
        let execution_namespace = execution_namespace.into();
        let stage = stage.into();
        let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
        let id = format!("{execution_namespace}-{stage}-{suffix}");
        Self {
            execution_namespace,
            stage,
            schedule,
            trans_mode,
            params,
            remote_call_timeout,
            post_ratio,
            id,
            unique_execution_id: String::new(),
            call_cnt: 0,
            call_time: 0.0,
            finish_time: 0.0,
        }
    }

    /// Bump `call_cnt`, mint a fresh `unique_execution_id`, and stamp
    /// `call_time` — the controller calls this immediately before handing
    /// the invocation to its `Invoker` (§3 "remote_call() bumps call_cnt and
    /// resets retval").
    pub fn remote_call(&mut self) {
        self.call_cnt += 1;
        self.unique_execution_id = format!("{}-uid-{}", self.id, self.call_cnt);
        self.call_time = now_secs();
    }

    /// Store key this invocation's outcome is written under.
    pub fn result_key(&self) -> String {
        store::keys::result(&self.unique_execution_id)
    }

    /// Prefix covering every Store key this invocation's namespace owns.
    pub fn namespace_prefix(&self) -> String {
        format!("{}-", self.execution_namespace)
    }
}

pub fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_call_bumps_call_cnt_and_changes_unique_execution_id() {
        let mut inv = StageInvocation::new(
            "ns-1",
            "add",
            HashMap::new(),
            TransportMode::Auto,
            Value::Null,
            10.0,
            0.0,
        );
        inv.remote_call();
        let first_uid = inv.unique_execution_id.clone();
        assert_eq!(inv.call_cnt, 1);

        inv.remote_call();
        assert_eq!(inv.call_cnt, 2);
        assert_ne!(inv.unique_execution_id, first_uid);
    }

    #[test]
    fn id_is_stable_across_retries() {
        let mut inv = StageInvocation::new(
            "ns-1",
            "add",
            HashMap::new(),
            TransportMode::Auto,
            Value::Null,
            10.0,
            0.0,
        );
        let id = inv.id.clone();
        inv.remote_call();
        inv.remote_call();
        assert_eq!(inv.id, id);
    }
}
