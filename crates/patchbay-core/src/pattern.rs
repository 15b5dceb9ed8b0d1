//! Pattern compilation and matching
//!
//! Operator-authored patterns are plain words or arbitrary regexes. The
//! effective matcher is derived from the raw text in two steps:
//!
//! - the qualified-name delimiter is appended as an optional group
//!   (`<pattern>\)?`), so one pattern matches both naming conventions;
//! - with plural handling enabled, a simple word token additionally gets an
//!   optional plural suffix before the delimiter (`<pattern>s?\)?`).
//!
//! Matching is always case-insensitive and always full-string.

use regex_lite::Regex;
use std::collections::HashMap;

/// Characters allowed in a "simple" token eligible for plural expansion.
/// Anything else is treated as a hand-written regex and left untouched.
fn is_simple_token(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '*')
}

fn ends_in_word_char(pattern: &str) -> bool {
    pattern
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derive the effective pattern text from the raw pattern.
///
/// Pure function of the raw text and the plural flag; recomputed on demand,
/// never stored as ground truth.
pub fn effective_pattern(raw: &str, plural_handling: bool) -> String {
    if plural_handling
        && is_simple_token(raw)
        && ends_in_word_char(raw)
        && !raw.ends_with("s?")
    {
        format!("{raw}s?\\)?")
    } else {
        format!("{raw}\\)?")
    }
}

/// A compiled matcher for one raw pattern.
///
/// A raw pattern that fails to compile yields a matcher that matches
/// nothing; there is no channel back to the operator at resolution time.
#[derive(Debug, Clone)]
pub struct Matcher {
    raw: String,
    effective: String,
    regex: Option<Regex>,
}

impl Matcher {
    pub fn compile(raw: &str, plural_handling: bool) -> Self {
        let effective = effective_pattern(raw, plural_handling);
        let regex = Regex::new(&format!("^(?i:{effective})$")).ok();
        Self {
            raw: raw.to_string(),
            effective,
            regex,
        }
    }

    /// Case-insensitive full-string match. No side effects.
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None => false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn effective(&self) -> &str {
        &self.effective
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }
}

/// Compiled matchers keyed by raw pattern text.
///
/// An edited pattern is a new key; stale entries are dropped eagerly so the
/// cache never outgrows the set of patterns currently in use.
#[derive(Debug)]
pub struct MatcherCache {
    plural_handling: bool,
    matchers: HashMap<String, Matcher>,
}

impl MatcherCache {
    pub fn new(plural_handling: bool) -> Self {
        Self {
            plural_handling,
            matchers: HashMap::new(),
        }
    }

    pub fn plural_handling(&self) -> bool {
        self.plural_handling
    }

    /// Get the matcher for a raw pattern, compiling on first use
    pub fn get(&mut self, raw: &str) -> &Matcher {
        if !self.matchers.contains_key(raw) {
            let matcher = Matcher::compile(raw, self.plural_handling);
            self.matchers.insert(raw.to_string(), matcher);
        }
        &self.matchers[raw]
    }

    /// Drop cache entries whose raw pattern is no longer referenced
    pub fn retain_patterns(&mut self, live: &[String]) {
        self.matchers.retain(|raw, _| live.iter().any(|p| p == raw));
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_pattern_plural() {
        assert_eq!(effective_pattern("camera", true), "cameras?\\)?");
        assert_eq!(effective_pattern("camera", false), "camera\\)?");
    }

    #[test]
    fn test_effective_pattern_leaves_regex_untouched() {
        // Ends in a metacharacter: no plural insertion
        assert_eq!(effective_pattern("camera.*", true), "camera.*\\)?");
        // Contains characters outside the simple set
        assert_eq!(effective_pattern("cam(era)?", true), "cam(era)?\\)?");
    }

    #[test]
    fn test_plural_contract() {
        let m = Matcher::compile("camera", true);
        assert!(m.matches("Camera)"));
        assert!(m.matches("Cameras)"));
        assert!(m.matches("camera"));
        assert!(m.matches("cameras"));
        assert!(!m.matches("CameraXYZ)"));
        assert!(!m.matches("Webcam)"));
    }

    #[test]
    fn test_full_match_only() {
        let m = Matcher::compile("cam", true);
        assert!(!m.matches("camera"));
        assert!(!m.matches("webcam"));
        assert!(m.matches("CAM"));
    }

    #[test]
    fn test_wildcard_pattern() {
        let m = Matcher::compile("camera.*", true);
        assert!(m.matches("Camera)"));
        assert!(m.matches("Camera2)"));
        assert!(m.matches("camera rear"));
        assert!(!m.matches("Projector)"));
    }

    #[test]
    fn test_invalid_pattern_matches_nothing() {
        let m = Matcher::compile("cam[", true);
        assert!(!m.is_valid());
        assert!(!m.matches("cam["));
        assert!(!m.matches("cam"));
    }

    #[test]
    fn test_cache_reuses_and_invalidates() {
        let mut cache = MatcherCache::new(true);
        assert_eq!(cache.get("camera").effective(), "cameras?\\)?");
        assert_eq!(cache.len(), 1);
        cache.get("camera");
        assert_eq!(cache.len(), 1);

        cache.get("projector");
        cache.retain_patterns(&["projector".to_string()]);
        assert_eq!(cache.len(), 1);
    }
}
