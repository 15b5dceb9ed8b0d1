//! Slot assignment
//!
//! The resolver maps the source directory, slot patterns, and lock flags to
//! slot assignments. It runs in one of two modes:
//!
//! - **priority**: a single source just appeared; only slots that match the
//!   newcomer (or whose current assignment still matches) are touched.
//! - **full rescan**: triggered by disappearance, manual refresh, or
//!   startup; every unlocked slot is re-validated against the directory.
//!
//! Locked slots are never evaluated. With the global lock set the whole
//! pass is a no-op. Pure and synchronous; runs to completion wherever it is
//! invoked.

use std::collections::BTreeSet;

use crate::pattern::MatcherCache;
use crate::slot::OutputSlot;
use crate::source::{visible_portion, Source, SourceDirectory};

/// Result of one resolver pass
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Indices of slots holding a verified assignment after the pass
    pub matched: BTreeSet<usize>,
    /// Whether any slot's assignment or placeholder flag changed
    pub changed: bool,
}

/// The assignment algorithm plus its compiled-pattern cache
#[derive(Debug)]
pub struct Resolver {
    cache: MatcherCache,
}

impl Resolver {
    pub fn new(plural_handling: bool) -> Self {
        Self {
            cache: MatcherCache::new(plural_handling),
        }
    }

    pub fn plural_handling(&self) -> bool {
        self.cache.plural_handling()
    }

    /// Drop cached matchers for patterns no longer in use (after an
    /// operator edits a slot's pattern or the slot list is replaced)
    pub fn retain_patterns(&mut self, live: &[String]) {
        self.cache.retain_patterns(live);
    }

    /// Recompute slot assignments.
    ///
    /// With `latest` supplied the pass runs in priority mode, otherwise as a
    /// full rescan. `global_lock` short-circuits the whole pass.
    pub fn resolve(
        &mut self,
        slots: &mut [OutputSlot],
        directory: &SourceDirectory,
        latest: Option<&Source>,
        global_lock: bool,
    ) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();
        if global_lock {
            return outcome;
        }

        match latest {
            Some(source) => self.resolve_latest(slots, source, &mut outcome),
            None => self.rescan(slots, directory, &mut outcome),
        }

        // Matched slots are live. Full rescan additionally flips every
        // unmatched unlocked slot to placeholder; priority mode only ever
        // clears the flag, so burst appearances cannot flap it.
        for slot in slots.iter_mut() {
            if slot.locked {
                continue;
            }
            if outcome.matched.contains(&slot.index) {
                if slot.placeholder {
                    slot.placeholder = false;
                    outcome.changed = true;
                }
            } else if latest.is_none() && !slot.placeholder {
                slot.placeholder = true;
                outcome.changed = true;
            }
        }

        outcome
    }

    fn resolve_latest(
        &mut self,
        slots: &mut [OutputSlot],
        latest: &Source,
        outcome: &mut ResolveOutcome,
    ) {
        let candidate = latest.visible();
        for slot in slots.iter_mut() {
            if slot.locked {
                continue;
            }
            let matcher = self.cache.get(&slot.pattern);
            if matcher.matches(candidate) {
                if slot.current_source != latest.name {
                    slot.current_source = latest.name.clone();
                    outcome.changed = true;
                }
                outcome.matched.insert(slot.index);
            } else if !slot.current_source.is_empty()
                && matcher.matches(visible_portion(&slot.current_source))
            {
                // Existing assignment still satisfies the pattern; keep it.
                outcome.matched.insert(slot.index);
            }
        }
    }

    fn rescan(
        &mut self,
        slots: &mut [OutputSlot],
        directory: &SourceDirectory,
        outcome: &mut ResolveOutcome,
    ) {
        for slot in slots.iter_mut() {
            if slot.locked {
                continue;
            }

            // A current assignment present verbatim in the directory stands,
            // whether or not it matches the pattern. This keeps a just-made
            // manual selection from being overridden by the rescan.
            if !slot.current_source.is_empty() && directory.contains(&slot.current_source) {
                outcome.matched.insert(slot.index);
                continue;
            }

            let matcher = self.cache.get(&slot.pattern);
            if !slot.current_source.is_empty()
                && matcher.matches(visible_portion(&slot.current_source))
            {
                outcome.matched.insert(slot.index);
                continue;
            }

            // First source in discovery order wins.
            if let Some(source) = directory.iter().find(|s| matcher.matches(s.visible())) {
                if slot.current_source != source.name {
                    slot.current_source = source.name.clone();
                    outcome.changed = true;
                }
                outcome.matched.insert(slot.index);
            }
            // No match: the stale assignment stays, the placeholder pass
            // flags the slot.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Resolution;

    fn slot(index: usize, pattern: &str) -> OutputSlot {
        OutputSlot::new(index, format!("Out{index}"), pattern, Resolution::new(1920, 1080))
    }

    fn directory(names: &[&str]) -> SourceDirectory {
        let mut dir = SourceDirectory::new();
        for name in names {
            dir.insert(Source::qualified(*name));
        }
        dir
    }

    #[test]
    fn test_rescan_assigns_first_match() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Projector)", "Camera)"]);
        let mut slots = vec![slot(0, "camera")];

        let outcome = resolver.resolve(&mut slots, &dir, None, false);
        assert_eq!(slots[0].current_source, "Camera)");
        assert!(!slots[0].placeholder);
        assert!(outcome.matched.contains(&0));
        assert!(outcome.changed);
    }

    #[test]
    fn test_tie_break_is_directory_order() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Camera)", "Camera2)"]);
        let mut slots = vec![slot(0, "camera.*")];

        resolver.resolve(&mut slots, &dir, None, false);
        assert_eq!(slots[0].current_source, "Camera)");
    }

    #[test]
    fn test_rescan_keeps_verbatim_present_source() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Projector)", "Camera)"]);
        let mut slots = vec![slot(0, "camera")];
        // Manual selection that does not match the pattern
        slots[0].current_source = "Projector)".to_string();

        let outcome = resolver.resolve(&mut slots, &dir, None, false);
        assert_eq!(slots[0].current_source, "Projector)");
        assert!(!slots[0].placeholder);
        assert!(outcome.matched.contains(&0));
    }

    #[test]
    fn test_rescan_unmatched_slot_goes_placeholder_and_keeps_stale_name() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Projector)"]);
        let mut slots = vec![slot(0, "camera")];
        slots[0].current_source = "Camera2)".to_string();
        slots[0].placeholder = false;

        let outcome = resolver.resolve(&mut slots, &dir, None, false);
        assert_eq!(slots[0].current_source, "Camera2)");
        assert!(slots[0].placeholder);
        assert!(!outcome.matched.contains(&0));
        assert!(outcome.changed);
    }

    #[test]
    fn test_priority_mode_assigns_matching_slots_only() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Camera)", "Projector)"]);
        let mut slots = vec![slot(0, "camera"), slot(1, "projector")];
        slots[1].current_source = "Projector)".to_string();
        slots[1].placeholder = false;

        let latest = Source::qualified("Camera)");
        let outcome = resolver.resolve(&mut slots, &dir, Some(&latest), false);

        assert_eq!(slots[0].current_source, "Camera)");
        assert!(!slots[0].placeholder);
        // Slot 1 untouched but its existing assignment still matches
        assert_eq!(slots[1].current_source, "Projector)");
        assert!(outcome.matched.contains(&1));
    }

    #[test]
    fn test_priority_mode_never_sets_placeholder() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Projector)"]);
        let mut slots = vec![slot(0, "camera")];
        slots[0].placeholder = false;
        slots[0].current_source = "Old)".to_string();

        let latest = Source::qualified("Projector)");
        let outcome = resolver.resolve(&mut slots, &dir, Some(&latest), false);

        // Neither the newcomer nor the stale assignment matches, yet the
        // placeholder flag is left alone in priority mode.
        assert!(!slots[0].placeholder);
        assert!(!outcome.matched.contains(&0));
    }

    #[test]
    fn test_locked_slot_skipped_in_both_modes() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Camera)"]);
        let mut slots = vec![slot(0, "camera")];
        slots[0].locked = true;
        slots[0].current_source = "Frozen)".to_string();
        slots[0].placeholder = false;

        let latest = Source::qualified("Camera)");
        resolver.resolve(&mut slots, &dir, Some(&latest), false);
        resolver.resolve(&mut slots, &dir, None, false);

        assert_eq!(slots[0].current_source, "Frozen)");
        assert!(!slots[0].placeholder);
    }

    #[test]
    fn test_global_lock_is_noop() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Camera)"]);
        let mut slots = vec![slot(0, "camera")];
        let before = slots.clone();

        let latest = Source::qualified("Camera)");
        let outcome = resolver.resolve(&mut slots, &dir, Some(&latest), true);
        assert_eq!(slots, before);
        assert!(!outcome.changed);

        let outcome = resolver.resolve(&mut slots, &dir, None, true);
        assert_eq!(slots, before);
        assert!(!outcome.changed);
    }

    #[test]
    fn test_rescan_idempotent() {
        let mut resolver = Resolver::new(true);
        let dir = directory(&["Camera)", "Projector)"]);
        let mut slots = vec![slot(0, "camera"), slot(1, "screen")];

        resolver.resolve(&mut slots, &dir, None, false);
        let after_first = slots.clone();
        let outcome = resolver.resolve(&mut slots, &dir, None, false);

        assert_eq!(slots, after_first);
        assert!(!outcome.changed);
    }

    #[test]
    fn test_local_source_matches_without_delimiter() {
        let mut resolver = Resolver::new(true);
        let mut dir = SourceDirectory::new();
        dir.insert(Source::local("camera"));
        let mut slots = vec![slot(0, "camera")];

        resolver.resolve(&mut slots, &dir, None, false);
        assert_eq!(slots[0].current_source, "camera");
        assert!(!slots[0].placeholder);
    }
}
