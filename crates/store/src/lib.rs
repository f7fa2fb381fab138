//! `store` crate — the shared KV [`Store`] abstraction (§2, §4.6) and its
//! two concrete backends.
//!
//! No business logic lives here, same division of labour as the teacher's
//! `db` crate this was built from — just the storage seam every other
//! crate (`worker`, `controller`, `durable`, `backends`) programs against.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::Store;

/// Key conventions every backend follows (§6 "Store key conventions").
pub mod keys {
    /// Stage-scoped shared data written by one workflow instance.
    pub fn namespaced(namespace: &str, user_key: &str) -> String {
        format!("{namespace}-{user_key}")
    }

    /// A workflow's final output, always routed through Store regardless
    /// of `TransportMode`.
    pub fn final_output(namespace: &str, user_key: &str) -> String {
        format!("{namespace}-__final_outputs__{user_key}")
    }

    /// Prefix covering every final-output key for one namespace.
    pub fn final_outputs_prefix(namespace: &str) -> String {
        format!("{namespace}-__final_outputs__")
    }

    /// Per-retry status key a worker writes its result to.
    pub fn result(unique_execution_id: &str) -> String {
        format!("{unique_execution_id}-result")
    }

    /// Durable orchestrator checkpoint key for one instance.
    pub fn orchestrator_state(instance_id: &str) -> String {
        format!("orchestrator::__state__::{instance_id}")
    }
}
