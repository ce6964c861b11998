//! Wildcard matching for stored permission patterns
//!
//! `*` in a pattern matches any run of characters, including `/` and `:`.
//! Everything else matches literally and the whole value must match.
//!
//! ```
//! use rbac_authz::pattern::matches;
//!
//! assert!(matches("/api/v1/users/*", "/api/v1/users/123"));
//! assert!(!matches("/api/v1/users/*", "/api/v1/users"));
//! assert!(matches("*", ""));
//! ```

use dashmap::DashMap;
use regex::Regex;
use tracing::warn;

/// The wildcard marker
pub const WILDCARD: char = '*';

/// Match a stored permission pattern against a requested literal value
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains(WILDCARD) {
        return pattern == value;
    }

    match compile(pattern) {
        Some(regex) => regex.is_match(value),
        None => false,
    }
}

/// Translate a wildcard pattern into an anchored regex.
///
/// Literal runs go through `regex::escape` so `.`, `+`, `(` and friends
/// never act as metacharacters.
fn compile(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match Regex::new(&format!("(?s)^{}$", body)) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Failed to compile permission pattern '{}': {}", pattern, e);
            None
        }
    }
}

/// Pattern matcher that memoizes compiled wildcard patterns.
///
/// Same semantics as [`matches`]; only patterns containing a wildcard (other
/// than the bare `*`) are compiled and kept.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    compiled: DashMap<String, Option<Regex>>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, pattern: &str, value: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if !pattern.contains(WILDCARD) {
            return pattern == value;
        }

        if let Some(entry) = self.compiled.get(pattern) {
            return entry.as_ref().is_some_and(|regex| regex.is_match(value));
        }

        let regex = compile(pattern);
        let result = regex.as_ref().is_some_and(|r| r.is_match(value));
        self.compiled.insert(pattern.to_string(), regex);
        result
    }

    /// Number of compiled patterns held
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_wildcard_matches_everything() {
        assert!(matches("*", "GET"));
        assert!(matches("*", "/api/v1/users/123"));
        assert!(matches("*", ""));
    }

    #[test]
    fn test_exact_patterns() {
        assert!(matches("GET", "GET"));
        assert!(matches("/api/v1/users", "/api/v1/users"));
        assert!(!matches("GET", "POST"));
        assert!(!matches("GET", "get"));
        assert!(!matches("/api/v1/users", "/api/v1/roles"));
    }

    #[test]
    fn test_empty_pattern_and_value() {
        assert!(matches("", ""));
        assert!(!matches("", "x"));
        assert!(!matches("x", ""));
        assert!(matches("a*", "a"));
        assert!(!matches("a*", ""));
    }

    #[test]
    fn test_suffix_wildcard() {
        assert!(matches("/api/v1/users/*", "/api/v1/users/123"));
        assert!(matches("/api/v1/users/*", "/api/v1/users/abc-def"));
        assert!(matches("/api/v1/users/*", "/api/v1/users/"));
        assert!(matches("/api/v1/users/*", "/api/v1/users/1/roles"));
        assert!(!matches("/api/v1/users/*", "/api/v1/users"));
    }

    #[test]
    fn test_action_wildcard() {
        assert!(matches("read:*", "read:users"));
        assert!(matches("read:*", "read:roles"));
        assert!(!matches("read:*", "write:users"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert!(matches("/api/*/users/*", "/api/v1/users/123"));
        assert!(matches("/api/*/users/*", "/api/v2/users/456"));
        assert!(!matches("/api/*/users/*", "/api/v1/roles/123"));
        assert!(matches("**", "anything"));
    }

    #[test]
    fn test_anchored_at_both_ends() {
        assert!(!matches("users*", "all-users-x"));
        assert!(!matches("*users", "users-x"));
        assert!(matches("*users*", "all-users-x"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("/api/v1.0/users", "/api/v1.0/users"));
        assert!(!matches("/api/v1.0/users", "/api/v100/users"));
        assert!(matches("user+admin", "user+admin"));
        assert!(!matches("user+admin", "useradmin"));
        assert!(matches("(a|b)*", "(a|b)-tail"));
        assert!(!matches("(a|b)*", "a-tail"));
        assert!(matches("v1.?*", "v1.?x"));
        assert!(!matches("v1.?*", "v12x"));
        assert!(matches("^$[]{}\\*", "^$[]{}\\anything"));
    }

    #[test]
    fn test_wildcard_spans_newlines() {
        assert!(matches("a*b", "a\nb"));
    }

    #[test]
    fn test_matcher_memoizes_compiled_patterns() {
        let matcher = PatternMatcher::new();
        assert!(matcher.matches("read:*", "read:users"));
        assert!(!matcher.matches("read:*", "write:users"));
        assert!(matcher.matches("*", "x"));
        assert!(matcher.matches("exact", "exact"));

        // Only the compiled wildcard pattern is kept
        assert_eq!(matcher.len(), 1);
    }

    #[test]
    fn test_only_the_bare_marker_short_circuits() {
        let matcher = PatternMatcher::new();
        assert!(matcher.matches("*", ""));
        assert!(matcher.is_empty());

        // Longer patterns made of markers still go through the regex path
        assert!(matcher.matches("**", ""));
        assert!(matcher.matches("*/*", "a/b"));
        assert!(!matcher.matches("*/*", "ab"));
        assert_eq!(matcher.len(), 2);
    }
}
