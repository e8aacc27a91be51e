//! Engine configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of site runs in a single drain of the run queue.
    /// `None` drains until the queue is empty, however long that takes.
    pub fuel: Option<usize>,
    /// Check that no vertex or site of a replaced tree is still owned by a
    /// live tree after every update
    pub validate_invariants: bool,
    /// Receiverless calls also dispatch to overriding methods of known subclasses
    pub subclass_dispatch_for_self_calls: bool,
    /// Move the installed state of unchanged definitions to the new tree
    /// instead of reinstalling them
    pub reuse_unchanged_definitions: bool,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn without_reuse(mut self) -> Self {
        self.reuse_unchanged_definitions = false;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel: None,
            validate_invariants: true,
            subclass_dispatch_for_self_calls: true,
            reuse_unchanged_definitions: true,
        }
    }
}
