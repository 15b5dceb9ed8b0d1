//! Source names and the ordered source directory
//!
//! Sources arrive from a discovery feed in one of two naming conventions:
//! network-qualified names carry a trailing `)` left over from stripping an
//! upstream `origin (` prefix, host-local names are bare. The directory
//! preserves discovery order; that order is the resolver's tie-break.

use serde::{Deserialize, Serialize};

/// Trailing delimiter of a network-qualified source name
pub const QUALIFIED_DELIMITER: char = ')';

/// Visibility scope of a source, determined by its discovery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceScope {
    /// Visible network-wide; display name ends in the literal delimiter
    Qualified,
    /// Visible only to router instances on the same host
    Local,
}

/// One available media source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub scope: SourceScope,
}

impl Source {
    pub fn new(name: impl Into<String>, scope: SourceScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    pub fn qualified(name: impl Into<String>) -> Self {
        Self::new(name, SourceScope::Qualified)
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, SourceScope::Local)
    }

    /// The portion of the name that patterns match against
    pub fn visible(&self) -> &str {
        visible_portion(&self.name)
    }
}

/// Strip one trailing qualified-name delimiter, if present
pub fn visible_portion(name: &str) -> &str {
    name.strip_suffix(QUALIFIED_DELIMITER).unwrap_or(name)
}

/// Ordered set of currently available sources, de-duplicated by exact name.
///
/// Insertion order is discovery order and is never re-sorted.
#[derive(Debug, Clone, Default)]
pub struct SourceDirectory {
    entries: Vec<Source>,
}

impl SourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Returns false if a source with the same name is
    /// already present (the existing entry keeps its position and scope).
    pub fn insert(&mut self, source: Source) -> bool {
        if self.contains(&source.name) {
            return false;
        }
        self.entries.push(source);
        true
    }

    /// Remove a source by exact name. Returns true if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.name != name);
        self.entries.len() != before
    }

    /// Exact-name membership test (case-sensitive, verbatim)
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.entries.iter()
    }

    /// All names, in discovery order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|s| s.name.clone()).collect()
    }

    /// Names of local-scope sources only, in discovery order
    pub fn local_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|s| s.scope == SourceScope::Local)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
