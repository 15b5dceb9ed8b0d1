//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use patchbay_core::Resolution;

use crate::error::{NodeError, Result};

fn default_true() -> bool {
    true
}

/// One output slot as configured by the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Output label shown to clients
    pub name: String,
    /// Raw source pattern (plain word or regex)
    pub pattern: String,
    #[serde(default)]
    pub resolution: Resolution,
}

/// Configuration of one router instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable instance identifier; commands are addressed to it
    pub id: String,
    /// Human-readable label; defaults to the id
    #[serde(default)]
    pub name: String,
    /// Host machine identifier; generated when absent
    #[serde(default)]
    pub machine_id: String,
    #[serde(default = "default_true")]
    pub plural_handling: bool,
    pub outputs: Vec<SlotConfig>,
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&text)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(NodeError::Config("instance id must not be empty".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(NodeError::Config("at least one output required".to_string()));
        }
        Ok(())
    }
}
