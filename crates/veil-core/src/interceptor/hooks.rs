//! Operation dispatch table.
//!
//! Host glue routes every interceptable call through [`HookTable::invoke`]
//! with the target and a closure producing the real result. An installed
//! handler may answer on its own or delegate to that closure.

use crate::error::{Result, VeilError};
use crate::overrides::OverrideStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// The object an intercepted operation was invoked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTarget {
    pub type_key: String,
    /// Host-specific instance handle, if any.
    pub instance: Option<u64>,
}

impl OperationTarget {
    pub fn of_type(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            instance: None,
        }
    }

    pub fn instance(type_key: impl Into<String>, instance: u64) -> Self {
        Self {
            type_key: type_key.into(),
            instance: Some(instance),
        }
    }
}

pub trait OperationHandler: Send + Sync {
    fn handle(&self, target: &OperationTarget, original: &dyn Fn() -> Value) -> Value;
}

/// Answers from the override store, falling through to the original.
pub struct OverrideHandler {
    store: Arc<OverrideStore>,
    target_type: String,
    property: String,
}

impl OverrideHandler {
    pub fn new(store: Arc<OverrideStore>, target_type: &str, property: &str) -> Self {
        Self {
            store,
            target_type: target_type.to_string(),
            property: property.to_string(),
        }
    }
}

impl OperationHandler for OverrideHandler {
    fn handle(&self, _target: &OperationTarget, original: &dyn Fn() -> Value) -> Value {
        match self.store.get_override(&self.target_type, &self.property) {
            Some(forced) => {
                trace!(target_type = %self.target_type, property = %self.property, "override served");
                forced
            }
            None => original(),
        }
    }
}

type HookKey = (String, String);

#[derive(Default)]
pub struct HookTable {
    handlers: RwLock<HashMap<HookKey, Arc<dyn OperationHandler>>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if the operation is already hooked; two interceptors must not
    /// silently fight over one slot.
    pub fn install_hook(
        &self,
        target_type: &str,
        operation: &str,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<()> {
        if target_type.is_empty() || operation.is_empty() {
            return Err(VeilError::InvalidArgument(
                "hook needs a target type and an operation".into(),
            ));
        }
        let key = (target_type.to_string(), operation.to_string());
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&key) {
            return Err(VeilError::InvalidArgument(format!(
                "{target_type}.{operation} is already hooked"
            )));
        }
        handlers.insert(key, handler);
        debug!(target_type, operation, "hook installed");
        Ok(())
    }

    pub fn remove_hook(&self, target_type: &str, operation: &str) -> bool {
        let removed = self
            .handlers
            .write()
            .remove(&(target_type.to_string(), operation.to_string()))
            .is_some();
        if removed {
            debug!(target_type, operation, "hook removed");
        }
        removed
    }

    pub fn is_hooked(&self, target_type: &str, operation: &str) -> bool {
        self.handlers
            .read()
            .contains_key(&(target_type.to_string(), operation.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Run `operation` on `target`, through its hook when one is installed.
    pub fn invoke(
        &self,
        operation: &str,
        target: &OperationTarget,
        original: &dyn Fn() -> Value,
    ) -> Value {
        // Clone the handler out so a handler may itself touch the table.
        let handler = self
            .handlers
            .read()
            .get(&(target.type_key.clone(), operation.to_string()))
            .cloned();
        match handler {
            Some(handler) => handler.handle(target, original),
            None => original(),
        }
    }
}
