//! Save/recall persistence boundary
//!
//! The payload is an ordered list of `{source, placeholder}` pairs, one per
//! slot by index. Where the data actually lives is the host's business;
//! [`JsonFileStore`] covers the common standalone case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{NodeError, Result};

/// Persisted state of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSlot {
    pub source: String,
    pub placeholder: bool,
}

/// Persistence facility, keyed by instance identity
pub trait ConfigStore: Send + Sync {
    /// Load the saved slot list; empty if nothing was ever saved
    fn load(&self, instance_id: &str) -> Result<Vec<SavedSlot>>;

    /// Persist the slot list, replacing any previous save
    fn store(&mut self, instance_id: &str, slots: &[SavedSlot]) -> Result<()>;
}

/// In-memory store; the default when no directory is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: HashMap<String, Vec<SavedSlot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, instance_id: &str) -> Result<Vec<SavedSlot>> {
        Ok(self.saved.get(instance_id).cloned().unwrap_or_default())
    }

    fn store(&mut self, instance_id: &str, slots: &[SavedSlot]) -> Result<()> {
        self.saved.insert(instance_id.to_string(), slots.to_vec());
        Ok(())
    }
}

/// One JSON file per instance id under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, instance_id: &str) -> PathBuf {
        // Instance ids are operator-chosen; keep them out of path syntax.
        let safe: String = instance_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self, instance_id: &str) -> Result<Vec<SavedSlot>> {
        let path = self.path_for(instance_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| NodeError::Persistence(format!("{}: {e}", path.display())))
    }

    fn store(&mut self, instance_id: &str, slots: &[SavedSlot]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string_pretty(slots)
            .map_err(|e| NodeError::Persistence(e.to_string()))?;
        fs::write(self.path_for(instance_id), text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        assert!(store.load("a").unwrap().is_empty());

        let slots = vec![SavedSlot {
            source: "Camera)".to_string(),
            placeholder: false,
        }];
        store.store("a", &slots).unwrap();
        assert_eq!(store.load("a").unwrap(), slots);
        assert!(store.load("b").unwrap().is_empty());
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("patchbay-test-{}", std::process::id()));
        let mut store = JsonFileStore::new(&dir);

        let slots = vec![
            SavedSlot {
                source: "Projector)".to_string(),
                placeholder: false,
            },
            SavedSlot {
                source: String::new(),
                placeholder: true,
            },
        ];
        store.store("stage/left", &slots).unwrap();
        assert_eq!(store.load("stage/left").unwrap(), slots);

        let _ = fs::remove_dir_all(&dir);
    }
}
