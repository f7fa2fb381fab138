//! `durable` crate — the durable continuation protocol (§4.8).
//!
//! Turns a sequential orchestrator body that issues `call`/`tell`s into a
//! resumable computation keyed by an instance id, backed by a
//! [`DurableActionLog`] checkpointed to the shared [`store::Store`] under
//! `orchestrator::__state__::{instanceId}`.

pub mod action;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod runtime;

pub use action::{Action, ActionKind, ActionStatus, DurableActionLog};
pub use dispatch::Dispatcher;
pub use error::DurableError;
pub use orchestrator::{OrchestratorMetadata, WaitingResult, WaitingResultRegistry};
pub use runtime::{target_sequence, DurableCtx, DurableOutcome, DurableRuntime, Orchestrator};
