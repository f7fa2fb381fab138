//! `worker` crate — hosts stages on one node (§4.5 "Worker").
//!
//! A worker receives [`StageInvocation`]s over HTTP, deduplicates retries by
//! `id` ([`RequestBuffer`]), executes the routed [`stage::Stage`], and
//! writes the outcome back to the shared [`store::Store`] rather than
//! replying inline. A companion [`CacheServer`] serves same-node reads over
//! raw TCP when the transport policy picks the worker-cache path.

pub mod cache;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod http;
pub mod invocation;
pub mod storage;
pub mod tcp_cache;
pub mod wire;

pub use cache::WorkerCache;
pub use dedup::{PushOutcome, RequestBuffer};
pub use error::WorkerError;
pub use http::{router, WorkerState};
pub use invocation::{Address, StageInvocation, StageOutcome, TransportMode};
pub use storage::ClusterStorage;
pub use tcp_cache::CacheServer;
pub use wire::WireRequest;
