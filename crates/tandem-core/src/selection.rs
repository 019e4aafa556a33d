//! File-selection configuration per connection role.
//!
//! A session reads files on the source side and writes them on the mirror
//! side, usually on different connections. Each side builds its own
//! [`SelectionConfig`] from the same rule arguments; the config lives only in
//! the registry of the connection that built it and is never broadcast.
//!
//! Rule *matching* belongs to the selection engine. This module parses the
//! raw rule arguments into an ordered rule list and keeps track of where
//! each file-list rule got its entries from.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pattern::{CompiledPattern, PatternFlags};
use crate::registry::SettingRegistry;

// ============================================================================
// Roles
// ============================================================================

/// Side of the session a selection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The side backups read from.
    Source,
    /// The side backups are written to.
    Mirror,
}

impl Role {
    pub fn from_is_source(is_source: bool) -> Self {
        if is_source {
            Self::Source
        } else {
            Self::Mirror
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// Anything that can tell which side of the session it belongs to.
pub trait RoleSource {
    fn is_source(&self) -> bool;

    fn role(&self) -> Role {
        Role::from_is_source(self.is_source())
    }
}

impl RoleSource for bool {
    fn is_source(&self) -> bool {
        *self
    }
}

impl RoleSource for Role {
    fn is_source(&self) -> bool {
        *self == Role::Source
    }
}

/// A selection root path tagged with its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectPath {
    pub path: PathBuf,
    pub source: bool,
}

impl SelectPath {
    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: true,
        }
    }

    pub fn mirror(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: false,
        }
    }
}

impl RoleSource for SelectPath {
    fn is_source(&self) -> bool {
        self.source
    }
}

// ============================================================================
// Quoting
// ============================================================================

/// Filename quoting in effect for a selection.
///
/// When enabled, characters in `chars_to_quote` are escaped with
/// `quoting_char` in names on the mirror side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMode {
    pub enabled: bool,
    pub chars_to_quote: String,
    pub quoting_char: char,
}

impl QuoteMode {
    /// Quoting disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            chars_to_quote: String::new(),
            quoting_char: ';',
        }
    }

    /// Reads the quoting settings from `registry`, falling back to defaults.
    pub fn from_registry(registry: &SettingRegistry) -> Self {
        let fallback = Self::disabled();
        Self {
            enabled: registry.get_bool("quoting_enabled").unwrap_or(fallback.enabled),
            chars_to_quote: registry
                .get_text("chars_to_quote")
                .map(str::to_string)
                .unwrap_or(fallback.chars_to_quote),
            quoting_char: registry
                .get_text("quoting_char")
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(fallback.quoting_char),
        }
    }
}

impl Default for QuoteMode {
    fn default() -> Self {
        Self::disabled()
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A single selection option as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRule {
    pub option: String,
    #[serde(default)]
    pub argument: String,
}

impl RawRule {
    pub fn new(option: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            argument: argument.into(),
        }
    }
}

/// A separately supplied rule source, such as the lines of a file list.
pub type RuleList = Vec<String>;

/// A parsed selection rule, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionRule {
    Include(String),
    Exclude(String),
    IncludeRegexp(CompiledPattern),
    ExcludeRegexp(CompiledPattern),
    /// Entries of the file list at index `list` of the extra rule lists.
    IncludeFilelist { list: usize, entries: Vec<String> },
    ExcludeFilelist { list: usize, entries: Vec<String> },
    ExcludeDeviceFiles,
}

/// Selection configuration bound to one role.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    role: Role,
    quote_mode: QuoteMode,
    rules: Vec<SelectionRule>,
}

impl SelectionConfig {
    pub fn new(role: Role, quote_mode: QuoteMode, rules: Vec<SelectionRule>) -> Self {
        Self {
            role,
            quote_mode,
            rules,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn quote_mode(&self) -> &QuoteMode {
        &self.quote_mode
    }

    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }
}

/// Errors raised while parsing selection rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown selection option: {option}")]
    UnknownOption { option: String },

    #[error("Selection option {option} requires an argument")]
    MissingArgument { option: String },

    #[error("Selection option {option} expects file list #{index}, but only {available} given")]
    MissingFilelist {
        option: String,
        index: usize,
        available: usize,
    },

    #[error("{unused} file list(s) given without a matching filelist option")]
    UnusedFilelists { unused: usize },

    #[error("Invalid regular expression {pattern}: {reason}")]
    InvalidRegexp { pattern: String, reason: String },
}

/// Interprets raw rule arguments into a selection configuration.
pub trait RuleParser {
    /// Parses `rules` together with the separately supplied `extra_lists`.
    ///
    /// Each extra list stays a distinct sequence; rules that consume one
    /// record which list they came from.
    fn parse(
        &self,
        role: Role,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> Result<SelectionConfig, SelectionError>;
}

impl<P: RuleParser + ?Sized> RuleParser for std::sync::Arc<P> {
    fn parse(
        &self,
        role: Role,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> Result<SelectionConfig, SelectionError> {
        (**self).parse(role, rules, quote_mode, extra_lists)
    }
}

/// Parser for the standard `--include`/`--exclude` option family.
///
/// File-list options consume the extra rule lists in order. Every list must
/// be consumed exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRuleParser;

impl RuleParser for StandardRuleParser {
    fn parse(
        &self,
        role: Role,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> Result<SelectionConfig, SelectionError> {
        let mut parsed = Vec::with_capacity(rules.len());
        let mut next_list = 0;

        for rule in rules {
            let option = rule.option.as_str();
            let rule = match option {
                "--include" => SelectionRule::Include(require_argument(rule)?),
                "--exclude" => SelectionRule::Exclude(require_argument(rule)?),
                "--include-regexp" => SelectionRule::IncludeRegexp(compile_rule(rule)?),
                "--exclude-regexp" => SelectionRule::ExcludeRegexp(compile_rule(rule)?),
                "--include-filelist" | "--exclude-filelist" => {
                    let entries = take_list(option, extra_lists, next_list)?;
                    let list = next_list;
                    next_list += 1;
                    if option == "--include-filelist" {
                        SelectionRule::IncludeFilelist { list, entries }
                    } else {
                        SelectionRule::ExcludeFilelist { list, entries }
                    }
                }
                "--exclude-device-files" => SelectionRule::ExcludeDeviceFiles,
                _ => {
                    return Err(SelectionError::UnknownOption {
                        option: option.to_string(),
                    })
                }
            };
            parsed.push(rule);
        }

        if next_list < extra_lists.len() {
            return Err(SelectionError::UnusedFilelists {
                unused: extra_lists.len() - next_list,
            });
        }

        Ok(SelectionConfig::new(role, quote_mode, parsed))
    }
}

fn require_argument(rule: &RawRule) -> Result<String, SelectionError> {
    if rule.argument.is_empty() {
        return Err(SelectionError::MissingArgument {
            option: rule.option.clone(),
        });
    }
    Ok(rule.argument.clone())
}

fn compile_rule(rule: &RawRule) -> Result<CompiledPattern, SelectionError> {
    let text = require_argument(rule)?;
    CompiledPattern::compile(&text, PatternFlags::default()).map_err(|e| {
        SelectionError::InvalidRegexp {
            pattern: text.clone(),
            reason: e.to_string(),
        }
    })
}

fn take_list(
    option: &str,
    extra_lists: &[RuleList],
    index: usize,
) -> Result<Vec<String>, SelectionError> {
    let list = extra_lists
        .get(index)
        .ok_or_else(|| SelectionError::MissingFilelist {
            option: option.to_string(),
            index,
            available: extra_lists.len(),
        })?;
    Ok(list
        .iter()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

// ============================================================================
// Selection Factory
// ============================================================================

/// Builds selection configs and installs them into the local registry.
#[derive(Debug, Clone, Default)]
pub struct SelectionFactory<P = StandardRuleParser> {
    parser: P,
}

impl SelectionFactory<StandardRuleParser> {
    /// Creates a factory using the standard option parser.
    pub fn standard() -> Self {
        Self {
            parser: StandardRuleParser,
        }
    }
}

impl<P: RuleParser> SelectionFactory<P> {
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// Parses the rules and stores the result in the slot for the role of
    /// `path`, replacing only that slot.
    ///
    /// Returns the role that was written.
    ///
    /// # Errors
    ///
    /// Whatever the rule parser raises; the registry is untouched.
    pub fn build_and_install(
        &self,
        registry: &mut SettingRegistry,
        path: &impl RoleSource,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> Result<Role, SelectionError> {
        let role = path.role();
        let config = self.parser.parse(role, rules, quote_mode, extra_lists)?;
        debug!(
            role = %role,
            rules = config.rules().len(),
            filelists = extra_lists.len(),
            "Selection built"
        );
        registry.set_selection(config);
        Ok(role)
    }
}
