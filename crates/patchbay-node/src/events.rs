//! Discovery boundary
//!
//! The core never talks to a discovery mechanism directly. A host adapter
//! (outside this crate) watches whatever feed exists and translates it into
//! these events, scope-tagged by the channel they arrived on.

use patchbay_core::SourceScope;

/// One batch of discovery changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Sources became available
    Appeared {
        names: Vec<String>,
        scope: SourceScope,
    },
    /// Sources went away
    Disappeared { names: Vec<String> },
}
