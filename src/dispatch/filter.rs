//! File-name pattern filtering in front of another sink.

use std::path::Path;

use regex::Regex;

use crate::error::ValidationError;
use crate::flags::Note;

use super::subscriber::{NotificationSink, SinkResult};

/// Extensions forwarded by [`PatternSink::extensions`] when none are configured.
pub const DEFAULT_WATCHED_EXTENSIONS: [&str; 3] = [".go", ".py", ".yaml"];

/// Forwards only deliveries whose file name matches one of its patterns.
///
/// Patterns are globs over the final path component: `*` matches any run of
/// characters and `?` a single character.
#[derive(Debug)]
pub struct PatternSink<S> {
    patterns: Vec<Regex>,
    inner: S,
}

impl<S: NotificationSink> PatternSink<S> {
    /// Compiles `patterns` and wraps `inner`. At least one pattern is required.
    pub fn new<I, P>(patterns: I, inner: S) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| compile_glob(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(ValidationError::InvalidPattern {
                pattern: String::new(),
                reason: "at least one pattern is required".to_string(),
            });
        }
        Ok(Self { patterns, inner })
    }

    /// Builds `*<ext>` patterns. Extensions may be given with or without the dot.
    pub fn extensions<I, P>(extensions: I, inner: S) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns: Vec<String> = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref();
                if ext.starts_with('.') {
                    format!("*{ext}")
                } else {
                    format!("*.{ext}")
                }
            })
            .collect();
        Self::new(patterns, inner)
    }

    /// Returns true if `path`'s file name matches any pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let Some(name) = Path::new(path).file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

impl<S: NotificationSink> NotificationSink for PatternSink<S> {
    fn deliver(&self, path: &str, note: &Note) -> SinkResult {
        if self.matches(path) {
            self.inner.deliver(path, note)
        } else {
            Ok(())
        }
    }
}

fn compile_glob(glob: &str) -> Result<Regex, ValidationError> {
    if glob.is_empty() {
        return Err(ValidationError::InvalidPattern {
            pattern: String::new(),
            reason: "pattern is empty".to_string(),
        });
    }

    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| ValidationError::InvalidPattern {
        pattern: glob.to_string(),
        reason: e.to_string(),
    })
}
