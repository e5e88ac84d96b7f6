//! Glob matching for action tokens and ARN patterns.
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character. Everything else is literal.

use crate::error::{PolicyError, PolicyResult};
use regex::Regex;

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct Matcher {
    /// Original pattern text
    pattern: String,
    /// Anchored regex equivalent
    regex: Regex,
}

impl Matcher {
    /// Compile a glob pattern
    ///
    /// # Errors
    ///
    /// Returns error if the pattern cannot be compiled
    pub fn new(pattern: &str) -> PolicyResult<Self> {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Check whether a value matches
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Get the original pattern
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Match a single pattern against a value
///
/// # Errors
///
/// Returns error if the pattern cannot be compiled
pub fn glob_match(pattern: &str, value: &str) -> PolicyResult<bool> {
    if pattern == "*" {
        return Ok(true);
    }
    if !pattern.contains(['*', '?']) {
        return Ok(pattern == value);
    }
    Ok(Matcher::new(pattern)?.is_match(value))
}

/// Match any of several patterns against a value
///
/// # Errors
///
/// Returns error if a pattern cannot be compiled
pub fn match_any<S: AsRef<str>>(patterns: &[S], value: &str) -> PolicyResult<bool> {
    for pattern in patterns {
        if glob_match(pattern.as_ref(), value)? {
            return Ok(true);
        }
    }
    Ok(false)
}
