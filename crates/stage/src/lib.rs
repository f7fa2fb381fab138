//! `stage` crate — the `Stage` trait, the Route Table, and built-in stage
//! implementations.
//!
//! A stage is a named user-provided handler that consumes a parameter object
//! and returns a value (GLOSSARY). Every built-in stage and every
//! user-registered one implements [`Stage`]; the active backend dispatches
//! execution through this trait object so DAG firing never depends on a
//! stage's concrete type.

pub mod error;
pub mod mock;
pub mod route;
pub mod traits;

pub use error::StageError;
pub use route::{RouteError, RouteTable};
pub use traits::{Stage, StageContext, StageStorage};
