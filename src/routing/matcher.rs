//! Rewrite rule matching.
//!
//! # Responsibilities
//! - Partition rewrite rules into an exact table and an ordered glob list
//! - Resolve a request path to its rewrite target
//!
//! # Design Decisions
//! - Exact sources always win over globs, whatever the declaration order
//! - A repeated exact source overwrites the earlier one (last wins)
//! - Among globs, the first match in declaration order wins
//! - Two containers evaluated in sequence; exact-beats-glob is not a
//!   total order on pattern specificity, so they are never merged

use std::collections::HashMap;

use crate::routing::glob::{is_pattern, Glob, GlobError};

/// Where a matched request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteTarget {
    /// A named remote function.
    Function { name: String },
    /// A path the request is rewritten to.
    Destination { path: String },
}

/// A single rewrite rule from the hosting configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    pub source: String,
    pub target: RewriteTarget,
}

impl RewriteRule {
    /// Rule sending `source` to the function `name`.
    pub fn function(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: RewriteTarget::Function { name: name.into() },
        }
    }

    /// Rule rewriting `source` to the path `destination`.
    pub fn destination(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: RewriteTarget::Destination {
                path: destination.into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct GlobRule {
    glob: Glob,
    target: RewriteTarget,
}

/// Compiled, immutable rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    exacts: HashMap<String, RewriteTarget>,
    globs: Vec<GlobRule>,
}

impl RuleMatcher {
    /// Compile an ordered list of rules. Malformed globs fail here, not at match time.
    pub fn new<'a, I>(rules: I) -> Result<Self, GlobError>
    where
        I: IntoIterator<Item = &'a RewriteRule>,
    {
        let mut matcher = Self::default();

        for rule in rules {
            if is_pattern(&rule.source) {
                matcher.globs.push(GlobRule {
                    glob: Glob::path(&rule.source)?,
                    target: rule.target.clone(),
                });
            } else {
                matcher
                    .exacts
                    .insert(normalize_source(&rule.source), rule.target.clone());
            }
        }

        tracing::debug!(
            exact_rules = matcher.exacts.len(),
            glob_rules = matcher.globs.len(),
            "Rewrite rules compiled"
        );

        Ok(matcher)
    }

    /// Resolve a path to its target, `None` if no rule applies.
    pub fn match_path(&self, path: &str) -> Option<&RewriteTarget> {
        if let Some(target) = self.exacts.get(path) {
            return Some(target);
        }

        self.globs
            .iter()
            .find(|rule| rule.glob.is_match(path))
            .map(|rule| &rule.target)
    }

    /// Number of compiled rules (exact + glob).
    pub fn len(&self) -> usize {
        self.exacts.len() + self.globs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_source(source: &str) -> String {
    if source.starts_with('/') {
        source.to_string()
    } else {
        format!("/{}", source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str) -> RewriteTarget {
        RewriteTarget::Function {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_exact_beats_glob() {
        let rules = vec![
            RewriteRule::function("/a/**", "f1"),
            RewriteRule::function("/a/b", "f2"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.match_path("/a/b"), Some(&function("f2")));
        assert_eq!(matcher.match_path("/a/b/c"), Some(&function("f1")));
        assert_eq!(matcher.match_path("/b"), None);
    }

    #[test]
    fn test_first_glob_wins() {
        let rules = vec![
            RewriteRule::function("/api/**", "api"),
            RewriteRule::function("**", "catch-all"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.match_path("/api/users"), Some(&function("api")));
        assert_eq!(matcher.match_path("/home"), Some(&function("catch-all")));
    }

    #[test]
    fn test_last_exact_wins() {
        let rules = vec![
            RewriteRule::function("/about", "old"),
            RewriteRule::function("/about", "new"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.match_path("/about"), Some(&function("new")));
    }

    #[test]
    fn test_destination_targets() {
        let rules = vec![RewriteRule::destination("**/!(*.js)", "/index.html")];
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(
            matcher.match_path("/some/page.html"),
            Some(&RewriteTarget::Destination {
                path: "/index.html".to_string()
            })
        );
        assert_eq!(matcher.match_path("/some/app.js"), None);
    }

    #[test]
    fn test_sources_are_normalized() {
        let rules = vec![
            RewriteRule::function("exact", "e"),
            RewriteRule::function("glob/**", "g"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.match_path("/exact"), Some(&function("e")));
        assert_eq!(matcher.match_path("/glob/x"), Some(&function("g")));
    }

    #[test]
    fn test_malformed_glob_fails_fast() {
        let rules = vec![RewriteRule::function("/!(oops/**", "f")];
        assert!(RuleMatcher::new(&rules).is_err());
    }

    #[test]
    fn test_match_is_pure() {
        let rules = vec![
            RewriteRule::function("/!(public)/**", "app"),
            RewriteRule::function("/public/index", "index"),
        ];
        let matcher = RuleMatcher::new(&rules).unwrap();

        for path in ["/public/index", "/x/y", "/public/z", "/"] {
            assert_eq!(matcher.match_path(path), matcher.match_path(path));
        }
    }
}
