//! Include pattern matching for sync jobs.
//!
//! Patterns are shell globs (`*`, `?`, `[...]`, literal text) evaluated
//! against the file name only, never the full path.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Compiled set of include patterns.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    /// Compiled glob set for matching.
    glob_set: GlobSet,
    /// Raw pattern strings, index-aligned with the glob set.
    patterns: Vec<String>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Create a matcher with no patterns. It matches nothing.
    pub fn new() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Compile a list of patterns.
    ///
    /// A pattern that is not a valid glob (an unclosed `[` for example) is
    /// matched as literal text instead of being rejected.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = match compile(pattern) {
                Ok(glob) => glob,
                Err(e) => {
                    warn!(pattern, error = %e, "Invalid glob, matching it literally");
                    match compile(&globset::escape(pattern)) {
                        Ok(glob) => glob,
                        Err(_) => continue,
                    }
                }
            };
            builder.add(glob);
            pattern_list.push(pattern.to_string());
        }

        let glob_set = builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build glob set, matching nothing");
            GlobSet::empty()
        });

        Self {
            glob_set,
            patterns: pattern_list,
        }
    }

    /// Check whether a file name matches any pattern.
    pub fn is_match(&self, filename: &str) -> bool {
        self.glob_set.is_match(filename)
    }

    /// The first pattern (in configuration order) matching `filename`.
    pub fn matched_pattern(&self, filename: &str) -> Option<&str> {
        self.glob_set
            .matches(filename)
            .into_iter()
            .min()
            .map(|idx| self.patterns[idx].as_str())
    }

    /// Get the list of patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(pattern: &str) -> Result<globset::Glob, globset::Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .case_insensitive(false)
        .build()
}

/// One-shot check of `filename` against `patterns`.
pub fn matches<S: AsRef<str>>(filename: &str, patterns: &[S]) -> bool {
    PatternMatcher::from_patterns(patterns).is_match(filename)
}
