//! The router instance
//!
//! Owns an ordered slot list, the source directory, and the lock flags;
//! invokes the resolver on discovery events and produces state snapshots
//! for the broker. Purely synchronous; the service layer wires it to a
//! connection and a discovery feed.

use tracing::{debug, info};
use uuid::Uuid;

use patchbay_core::{
    effective_pattern, unix_now, Error, OutputSlot, Resolver, Source, SourceDirectory,
    SourceScope, StateSnapshot,
};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::persist::{ConfigStore, SavedSlot};

pub struct RouterInstance {
    id: String,
    name: String,
    machine_id: String,
    slots: Vec<OutputSlot>,
    directory: SourceDirectory,
    global_lock: bool,
    resolver: Resolver,
}

impl RouterInstance {
    pub fn new(config: NodeConfig) -> Self {
        let name = if config.name.is_empty() {
            config.id.clone()
        } else {
            config.name
        };
        let machine_id = if config.machine_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            config.machine_id
        };
        let slots = config
            .outputs
            .iter()
            .enumerate()
            .map(|(i, slot)| OutputSlot::new(i, &slot.name, &slot.pattern, slot.resolution))
            .collect();

        Self {
            id: config.id,
            name,
            machine_id,
            slots,
            directory: SourceDirectory::new(),
            global_lock: false,
            resolver: Resolver::new(config.plural_handling),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[OutputSlot] {
        &self.slots
    }

    pub fn directory(&self) -> &SourceDirectory {
        &self.directory
    }

    pub fn global_lock(&self) -> bool {
        self.global_lock
    }

    /// Discovery reported new sources. Each genuinely-new name is added to
    /// the directory, then resolved in priority mode, most recent first.
    /// Returns true if any slot changed.
    pub fn on_sources_appeared(&mut self, names: &[String], scope: SourceScope) -> bool {
        let mut fresh = Vec::new();
        for name in names {
            if self.directory.insert(Source::new(name.clone(), scope)) {
                fresh.push(name.clone());
            }
        }
        debug!("Sources appeared: {:?} ({} new)", names, fresh.len());

        let mut changed = false;
        for name in fresh.iter().rev() {
            let latest = Source::new(name.clone(), scope);
            let outcome =
                self.resolver
                    .resolve(&mut self.slots, &self.directory, Some(&latest), self.global_lock);
            changed |= outcome.changed;
        }
        changed
    }

    /// Discovery reported sources gone; one full rescan follows the removal
    pub fn on_sources_disappeared(&mut self, names: &[String]) -> bool {
        for name in names {
            self.directory.remove(name);
        }
        debug!("Sources disappeared: {:?}", names);
        self.rescan()
    }

    /// Manual full rescan
    pub fn refresh(&mut self) -> bool {
        self.rescan()
    }

    fn rescan(&mut self) -> bool {
        self.resolver
            .resolve(&mut self.slots, &self.directory, None, self.global_lock)
            .changed
    }

    /// Manual override. Bypasses the resolver and wins over locks; only an
    /// out-of-range index fails.
    pub fn set_source(&mut self, block_idx: usize, source_name: &str) -> Result<()> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(block_idx)
            .ok_or(Error::BlockOutOfRange { index: block_idx, count })?;
        info!("Manual source for block {}: {}", block_idx, source_name);
        slot.current_source = source_name.to_string();
        Ok(())
    }

    /// Flag mutation only; locking stops future automatic changes but does
    /// not revisit the current assignment.
    pub fn set_lock(&mut self, block_idx: usize, locked: bool) -> Result<()> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(block_idx)
            .ok_or(Error::BlockOutOfRange { index: block_idx, count })?;
        slot.locked = locked;
        Ok(())
    }

    pub fn set_global_lock(&mut self, locked: bool) {
        self.global_lock = locked;
    }

    /// Replace a slot's raw pattern. Takes effect on the next resolver
    /// pass; the matcher cache drops the edited-out entry.
    pub fn set_pattern(&mut self, block_idx: usize, pattern: &str) -> Result<()> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(block_idx)
            .ok_or(Error::BlockOutOfRange { index: block_idx, count })?;
        slot.pattern = pattern.to_string();
        let live: Vec<String> = self.slots.iter().map(|s| s.pattern.clone()).collect();
        self.resolver.retain_patterns(&live);
        Ok(())
    }

    /// Replace the slot list wholesale (external resize). Indices are
    /// renumbered; assignments start over as placeholders.
    pub fn configure_slots(&mut self, slots: Vec<OutputSlot>) {
        self.slots = slots;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.index = i;
        }
        let live: Vec<String> = self.slots.iter().map(|s| s.pattern.clone()).collect();
        self.resolver.retain_patterns(&live);
    }

    /// Persist `(source, placeholder)` per slot, by index
    pub fn save_configuration(&self, store: &mut dyn ConfigStore) -> Result<()> {
        let saved: Vec<SavedSlot> = self
            .slots
            .iter()
            .map(|slot| SavedSlot {
                source: slot.current_source.clone(),
                placeholder: slot.placeholder,
            })
            .collect();
        info!("Saving configuration for {} ({} slots)", self.id, saved.len());
        store.store(&self.id, &saved)
    }

    /// Restore a saved configuration. A saved source still present in the
    /// directory is restored with its saved placeholder flag; a vanished
    /// one forces the placeholder on regardless of what was saved.
    pub fn recall_configuration(&mut self, store: &dyn ConfigStore) -> Result<()> {
        let saved = store.load(&self.id)?;
        info!("Recalling configuration for {} ({} slots)", self.id, saved.len());
        for (slot, entry) in self.slots.iter_mut().zip(saved) {
            slot.current_source = entry.source;
            slot.placeholder =
                entry.placeholder || !self.directory.contains(&slot.current_source);
        }
        Ok(())
    }

    /// Immutable snapshot of this instance's state for the broker
    pub fn snapshot(&self) -> StateSnapshot {
        let plural = self.resolver.plural_handling();
        StateSnapshot {
            component_id: Some(self.id.clone()),
            name: self.name.clone(),
            machine_id: self.machine_id.clone(),
            sources: self.directory.names(),
            local_sources: self.directory.local_names(),
            output_names: self.slots.iter().map(|s| s.name.clone()).collect(),
            current_sources: self.slots.iter().map(|s| s.current_source.clone()).collect(),
            regex_patterns: self.slots.iter().map(|s| s.pattern.clone()).collect(),
            effective_regex_patterns: self
                .slots
                .iter()
                .map(|s| effective_pattern(&s.pattern, plural))
                .collect(),
            output_resolutions: self.slots.iter().map(|s| s.resolution).collect(),
            output_locks: self.slots.iter().map(|s| s.locked).collect(),
            global_lock: self.global_lock,
            plural_handling_enabled: plural,
            last_update: unix_now(),
        }
    }
}
