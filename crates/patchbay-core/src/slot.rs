//! Output slot model

use serde::{Deserialize, Serialize};

/// Pixel dimensions of one output. Serializes as a `[width, height]` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(r: Resolution) -> Self {
        (r.width, r.height)
    }
}

/// One addressable routing destination with a pattern rule and its current
/// assignment.
///
/// `current_source`, if non-empty, is the literal value most recently set by
/// the resolver or a manual command; it is not guaranteed to still exist in
/// the directory. `placeholder` means no live, verified source is routed
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    pub index: usize,
    pub name: String,
    pub pattern: String,
    pub current_source: String,
    pub locked: bool,
    pub placeholder: bool,
    pub resolution: Resolution,
}

impl OutputSlot {
    pub fn new(
        index: usize,
        name: impl Into<String>,
        pattern: impl Into<String>,
        resolution: Resolution,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            pattern: pattern.into(),
            current_source: String::new(),
            locked: false,
            placeholder: true,
            resolution,
        }
    }
}
