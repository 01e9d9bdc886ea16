use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use conflux_core::error::{ConfluxError, Result};

/// Mutable key/value state carried between nodes within one run.
///
/// Owned exclusively by its run; never shared across runs. Keys are
/// untyped here; type checking happens at the node mapping layer against
/// the tool's declared schema. Once the run reaches a terminal status
/// the context is frozen and every write fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStore {
    owner: String,
    data: HashMap<String, serde_json::Value>,
    frozen: bool,
}

impl ContextStore {
    /// Create a context for a run, seeded from the submitted input.
    pub fn for_run(
        owner: impl Into<String>,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            owner: owner.into(),
            data: input.into_iter().collect(),
            frozen: false,
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Result<&serde_json::Value> {
        self.data
            .get(key)
            .ok_or_else(|| ConfluxError::MissingKey(key.to_string()))
    }

    /// Get a value by key, None if absent.
    pub fn get_opt(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Set a value, overwriting any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        if self.frozen {
            return Err(ConfluxError::ContextFrozen(self.owner.clone()));
        }
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Apply multiple writes as one operation. The engine holds the
    /// instance lock across the call, so concurrent readers of the same
    /// run see either none or all of the writes.
    pub fn merge(&mut self, writes: serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if self.frozen {
            return Err(ConfluxError::ContextFrozen(self.owner.clone()));
        }
        for (key, value) in writes {
            self.data.insert(key, value);
        }
        Ok(())
    }

    /// Make the context read-only. Called when the run reaches a terminal
    /// status; there is no unfreeze.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The underlying data map.
    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }
}
