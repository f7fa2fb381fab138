//! Route Table — §4.3. Name → [`Stage`] handler registry, bound once at
//! workflow construction time and frozen before execution begins.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::Stage;

/// Errors produced by route lookup.
#[derive(Debug, Error)]
pub enum RouteError {
    /// `route(name)` was called for a name never `register`ed.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// `register` was called with a name already present.
    #[error("stage '{0}' is already registered")]
    DuplicateStage(String),
}

/// Mapping stage-name → [`Stage`] implementation.
///
/// Built by user code via [`RouteTable::register`], then handed to the
/// active backend. There is no global/static registry — the table is an
/// explicit object constructed at handler-factory time, per Design Notes §9
/// ("Global routeBuilder singleton").
#[derive(Default, Clone)]
pub struct RouteTable {
    handlers: HashMap<String, Arc<dyn Stage>>,
    frozen: bool,
}

impl RouteTable {
    /// Create an empty, unfrozen route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage handler under `name`.
    ///
    /// # Errors
    /// Returns [`RouteError::DuplicateStage`] if `name` is already
    /// registered, since keys must be unique (§3 RouteTable invariant).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Stage>,
    ) -> Result<(), RouteError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RouteError::DuplicateStage(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Freeze the table; no further `register` calls are expected once
    /// workflow execution begins (enforced by convention, not by type —
    /// callers that mutate after `freeze` simply violate the invariant).
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the table has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Look up a handler by name.
    ///
    /// # Errors
    /// Returns [`RouteError::UnknownStage`] if `name` was never registered.
    pub fn route(&self, name: &str) -> Result<Arc<dyn Stage>, RouteError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RouteError::UnknownStage(name.to_string()))
    }

    /// Names of every registered stage, for diagnostics.
    pub fn stage_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStage;
    use serde_json::json;

    #[test]
    fn register_and_route_roundtrip() {
        let mut table = RouteTable::new();
        table
            .register("add", Arc::new(MockStage::returning("add", json!({"res": 1}))))
            .unwrap();

        let handler = table.route("add").expect("should resolve");
        assert!(Arc::ptr_eq(&handler, &table.route("add").unwrap()));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let table = RouteTable::new();
        assert!(matches!(table.route("ghost"), Err(RouteError::UnknownStage(name)) if name == "ghost"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut table = RouteTable::new();
        table
            .register("add", Arc::new(MockStage::returning("add", json!({}))))
            .unwrap();
        let err = table.register("add", Arc::new(MockStage::returning("add", json!({}))));
        assert!(matches!(err, Err(RouteError::DuplicateStage(name)) if name == "add"));
    }
}
