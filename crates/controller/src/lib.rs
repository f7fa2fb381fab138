//! `controller` crate — runs one or more workflow instances against a
//! deployment profile (§4.4 "Controller").
//!
//! [`profile::Profile`] loads the YAML deployment profile; [`deploy`]
//! turns it into a placement and Kubernetes manifests; [`invoke::Invoker`]
//! is how the controller reaches a worker; [`engine::Engine`] runs one
//! instance's PENDING→EXECUTING→SUCCESS/FAILURE loop to completion.

pub mod deploy;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod profile;

pub use engine::{Engine, EngineConfig, RemoteDispatcher, StageDispatcher};
pub use error::{DeployError, EngineError, InvokeError};
pub use invoke::{HttpInvoker, Invoker};
pub use profile::Profile;
