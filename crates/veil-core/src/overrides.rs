//! Concurrent override store.
//!
//! Maps `(target type, property)` to a forced value. Interceptors read it on
//! every hooked call, configuration code writes it rarely, so the map sits
//! behind a reader-writer lock.

use crate::error::{Result, VeilError};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Property name → forced value, for a single target type.
pub type PropertyOverrides = HashMap<String, Value>;

/// Target type → property overrides.
pub type OverrideMap = HashMap<String, PropertyOverrides>;

#[derive(Debug, Default)]
pub struct OverrideStore {
    entries: RwLock<OverrideMap>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force `value` for `property` on `target_type`. Last write wins.
    pub fn set_override(&self, target_type: &str, property: &str, value: Value) -> Result<()> {
        validate_entry(target_type, property, &value)?;
        self.entries
            .write()
            .entry(target_type.to_string())
            .or_default()
            .insert(property.to_string(), value);
        debug!(target_type, property, "override set");
        Ok(())
    }

    pub fn get_override(&self, target_type: &str, property: &str) -> Option<Value> {
        self.entries
            .read()
            .get(target_type)
            .and_then(|props| props.get(property))
            .cloned()
    }

    pub fn has_override(&self, target_type: &str, property: &str) -> bool {
        self.entries
            .read()
            .get(target_type)
            .map(|props| props.contains_key(property))
            .unwrap_or(false)
    }

    /// Returns true only if an entry existed and was removed.
    pub fn remove_override(&self, target_type: &str, property: &str) -> bool {
        let mut entries = self.entries.write();
        let Some(props) = entries.get_mut(target_type) else {
            return false;
        };
        let removed = props.remove(property).is_some();
        if props.is_empty() {
            entries.remove(target_type);
        }
        if removed {
            debug!(target_type, property, "override removed");
        }
        removed
    }

    /// Apply every well-formed entry in `overrides`.
    ///
    /// Best-effort: malformed entries are logged and skipped, the rest are
    /// still applied. Returns false if anything was skipped.
    pub fn bulk_apply(&self, overrides: &OverrideMap) -> bool {
        let mut clean = true;
        let mut entries = self.entries.write();
        for (target_type, props) in overrides {
            for (property, value) in props {
                if let Err(e) = validate_entry(target_type, property, value) {
                    warn!(target_type = %target_type, property = %property, error = %e, "skipping malformed override");
                    clean = false;
                    continue;
                }
                entries
                    .entry(target_type.clone())
                    .or_default()
                    .insert(property.clone(), value.clone());
            }
        }
        clean
    }

    pub fn clear_all(&self) {
        self.entries.write().clear();
        debug!("all overrides cleared");
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> OverrideMap {
        self.entries.read().clone()
    }

    pub fn overrides_for_type(&self, target_type: &str) -> PropertyOverrides {
        self.entries
            .read()
            .get(target_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of (type, property) entries.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(|props| props.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn validate_entry(target_type: &str, property: &str, value: &Value) -> Result<()> {
    if target_type.is_empty() {
        return Err(VeilError::InvalidArgument("empty target type".into()));
    }
    if property.is_empty() {
        return Err(VeilError::InvalidArgument(format!(
            "empty property on {target_type}"
        )));
    }
    if value.is_null() {
        return Err(VeilError::InvalidArgument(format!(
            "null value for {target_type}.{property}"
        )));
    }
    Ok(())
}
