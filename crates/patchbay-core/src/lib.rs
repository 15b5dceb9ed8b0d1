//! Patchbay Core
//!
//! Core types and algorithms for Patchbay, the pattern-based router for
//! named media sources.
//!
//! This crate provides:
//! - Source names and the ordered source directory ([`Source`],
//!   [`SourceDirectory`])
//! - Pattern compilation and matching ([`Matcher`], [`MatcherCache`])
//! - The slot assignment algorithm ([`Resolver`])
//! - The JSON wire protocol ([`Message`], [`StateSnapshot`], [`MergedState`])
//!
//! Everything here is pure and synchronous; transport and concurrency live
//! in the sibling crates.

pub mod error;
pub mod pattern;
pub mod protocol;
pub mod resolver;
pub mod slot;
pub mod source;

pub use error::{Error, Result};
pub use pattern::{effective_pattern, Matcher, MatcherCache};
pub use protocol::{
    decode, encode, unix_now, ClientRole, ComponentInfo, MergedState, Message, StatePayload,
    StateSnapshot,
};
pub use resolver::{ResolveOutcome, Resolver};
pub use slot::{OutputSlot, Resolution};
pub use source::{visible_portion, Source, SourceDirectory, SourceScope, QUALIFIED_DELIMITER};

/// Default relay WebSocket port
pub const DEFAULT_PORT: u16 = 8080;
