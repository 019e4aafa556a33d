//! Compiled pattern matchers.
//!
//! A pattern setting is stored as a compiled [`regex::Regex`] together with
//! its source text and flags, so it can be shipped to another connection as
//! text and recompiled there.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Matching flags applied when compiling a pattern.
///
/// The default (all false) is the platform-default matching mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
}

impl PatternFlags {
    /// Flags for case-insensitive matching only.
    pub const CASE_INSENSITIVE: PatternFlags = PatternFlags {
        case_insensitive: true,
        multi_line: false,
        dot_matches_new_line: false,
        ignore_whitespace: false,
    };

    /// Returns true if no flag is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parses inline-flag letters such as `"i"` or `"ms"`.
    ///
    /// Returns `None` on any letter outside `imsx`.
    pub fn from_letters(letters: &str) -> Option<Self> {
        let mut flags = Self::default();
        for c in letters.chars() {
            match c {
                'i' => flags.case_insensitive = true,
                'm' => flags.multi_line = true,
                's' => flags.dot_matches_new_line = true,
                'x' => flags.ignore_whitespace = true,
                _ => return None,
            }
        }
        Some(flags)
    }
}

impl fmt::Display for PatternFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.case_insensitive {
            f.write_str("i")?;
        }
        if self.multi_line {
            f.write_str("m")?;
        }
        if self.dot_matches_new_line {
            f.write_str("s")?;
        }
        if self.ignore_whitespace {
            f.write_str("x")?;
        }
        Ok(())
    }
}

/// An executable matcher compiled from pattern text.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    flags: PatternFlags,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles `source` with `flags`.
    pub fn compile(source: &str, flags: PatternFlags) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .dot_matches_new_line(flags.dot_matches_new_line)
            .ignore_whitespace(flags.ignore_whitespace)
            .build()?;

        Ok(Self {
            source: source.to_string(),
            flags,
            regex,
        })
    }

    /// Returns true if the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Returns the pattern text this matcher was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> PatternFlags {
        self.flags
    }
}

// Two matchers are equal when they were compiled from the same text and flags.
impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl Eq for CompiledPattern {}
