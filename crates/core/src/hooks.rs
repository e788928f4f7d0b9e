//! Shared key/value scope for lifecycle hooks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Shared, mutable key→value scope passed by reference into job lifecycle
/// hooks (`on_creation`, `on_completion`).
///
/// Lets hooks read manager-level state (feature flags, tenant settings)
/// without a separate dependency-injection mechanism. Cloning is cheap and
/// every clone observes the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().unwrap().insert(key.into(), value);
    }

    /// Fetch a copy of the value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Remove and return the value for `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}
