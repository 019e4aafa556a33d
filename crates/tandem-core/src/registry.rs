//! Name-keyed setting registry with a change journal.
//!
//! The registry is the per-process store every connection keeps. Whole-value
//! assignments through the `set` family are journaled in the change log so
//! an external synchronization step can replay them on peers; in-place
//! mapping edits and selection slots are connection-local and not journaled.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Every lookup of an absent name returns `SettingError::UnknownSetting`

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::defaults;
use crate::error::{SettingError, SettingResult};
use crate::fatal::{ExitSink, FatalSink};
use crate::pattern::{CompiledPattern, PatternFlags};
use crate::selection::{Role, SelectionConfig};
use crate::value::{SettingKind, SettingValue};

// ============================================================================
// Setting Registry
// ============================================================================

/// Typed, name-keyed store of configuration values.
///
/// # Ownership
///
/// One registry exists per process. It is owned by the session and shared
/// through [`crate::SettingsHandle`], which serializes every mutation so the
/// change log order always equals call order.
pub struct SettingRegistry {
    /// Current values keyed by setting name.
    values: HashMap<String, SettingValue>,

    /// Names assigned since the last drain, in call order, duplicates kept.
    change_log: Vec<String>,

    /// Active selection configuration per role.
    selections: HashMap<Role, SelectionConfig>,

    /// Receiver of unrecoverable configuration errors.
    fatal: Arc<dyn FatalSink>,
}

impl SettingRegistry {
    /// Creates an empty registry that exits the process on fatal errors.
    pub fn new() -> Self {
        Self::with_fatal_sink(Arc::new(ExitSink))
    }

    /// Creates an empty registry reporting fatal errors to `sink`.
    pub fn with_fatal_sink(sink: Arc<dyn FatalSink>) -> Self {
        Self {
            values: HashMap::new(),
            change_log: Vec::new(),
            selections: HashMap::new(),
            fatal: sink,
        }
    }

    /// Creates a registry seeded with the process defaults.
    ///
    /// Seeding bypasses the change log: every peer starts from the same
    /// defaults, so only later assignments need replaying.
    pub fn with_defaults(sink: Arc<dyn FatalSink>) -> Self {
        let mut registry = Self::with_fatal_sink(sink);
        for (name, value) in defaults::defaults() {
            registry.values.insert(name.to_string(), value);
        }
        registry
    }

    /// Returns the sink fatal errors are reported to.
    pub fn fatal_sink(&self) -> Arc<dyn FatalSink> {
        Arc::clone(&self.fatal)
    }

    // ========================================================================
    // Whole-value access
    // ========================================================================

    /// Returns the value of `name`.
    ///
    /// # Errors
    ///
    /// `SettingError::UnknownSetting` if `name` was never set.
    pub fn get(&self, name: &str) -> SettingResult<&SettingValue> {
        self.values
            .get(name)
            .ok_or_else(|| SettingError::unknown(name))
    }

    /// Stores `value` under `name`, overwriting any prior value, and appends
    /// `name` to the change log.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        let name = name.into();
        let value = value.into();
        debug!(name = %name, kind = %value.kind(), "Setting updated");
        self.change_log.push(name.clone());
        self.values.insert(name, value);
    }

    /// Coerces `raw` to an integer and stores it like [`Self::set`].
    ///
    /// Surrounding whitespace is ignored and a leading sign is accepted.
    ///
    /// # Errors
    ///
    /// `SettingError::FatalConfiguration` if `raw` is not an integer. The
    /// error is reported to the fatal sink first; neither the value nor the
    /// change log is touched.
    pub fn set_integer(&mut self, name: &str, raw: &str) -> SettingResult<()> {
        match parse_integer(name, raw) {
            Ok(value) => {
                self.set(name, value);
                Ok(())
            }
            Err(err) => {
                self.fatal.fatal(name, &err.to_string());
                Err(err)
            }
        }
    }

    // ========================================================================
    // Mapping access
    // ========================================================================

    /// Returns entry `key` of the mapping stored at `name`.
    ///
    /// # Errors
    ///
    /// - `SettingError::UnknownSetting` if `name` is unset or not a mapping
    /// - `SettingError::KeyNotFound` if the mapping has no entry for `key`
    pub fn get_map_entry(&self, name: &str, key: &str) -> SettingResult<&SettingValue> {
        let map = self.map(name)?;
        map.get(key).ok_or_else(|| SettingError::KeyNotFound {
            name: name.to_string(),
            key: key.to_string(),
        })
    }

    /// Inserts or overwrites `key -> value` inside the mapping at `name`.
    ///
    /// In-place edits are not journaled; only whole-setting assignment is.
    ///
    /// # Errors
    ///
    /// `SettingError::UnknownSetting` if `name` is unset or not a mapping.
    pub fn set_map_entry(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<SettingValue>,
    ) -> SettingResult<()> {
        match self.values.get_mut(name) {
            Some(SettingValue::Map(map)) => {
                let key = key.into();
                trace!(name = %name, key = %key, "Mapping entry updated");
                map.insert(key, value.into());
                Ok(())
            }
            _ => Err(SettingError::unknown(name)),
        }
    }

    fn map(&self, name: &str) -> SettingResult<&BTreeMap<String, SettingValue>> {
        self.values
            .get(name)
            .and_then(SettingValue::as_map)
            .ok_or_else(|| SettingError::unknown(name))
    }

    // ========================================================================
    // Change log
    // ========================================================================

    /// Returns the names assigned since the last drain, without clearing.
    pub fn change_log(&self) -> &[String] {
        &self.change_log
    }

    /// Returns the change log and clears it.
    ///
    /// Order and duplicates are preserved.
    pub fn drain_change_log(&mut self) -> Vec<String> {
        let drained = std::mem::take(&mut self.change_log);
        debug!(entries = drained.len(), "Change log drained");
        drained
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    /// Compiles `pattern` and stores the matcher under `name`.
    ///
    /// This is the receiving end of a pattern broadcast. Like the assignment
    /// of compiled matchers on every peer, it is not journaled.
    ///
    /// # Errors
    ///
    /// `SettingError::PatternCompile` if the text does not compile; the
    /// registry is unchanged.
    pub fn install_pattern(
        &mut self,
        name: &str,
        pattern: &str,
        flags: PatternFlags,
    ) -> SettingResult<()> {
        let compiled =
            CompiledPattern::compile(pattern, flags).map_err(|e| SettingError::PatternCompile {
                name: name.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        debug!(name = %name, pattern = %pattern, flags = %flags, "Pattern installed");
        self.values
            .insert(name.to_string(), SettingValue::Pattern(compiled));
        Ok(())
    }

    // ========================================================================
    // Selection slots
    // ========================================================================

    /// Returns the active selection configuration for `role`.
    pub fn selection(&self, role: Role) -> Option<&SelectionConfig> {
        self.selections.get(&role)
    }

    /// Stores `config` in the slot for its role, returning the replaced one.
    pub fn set_selection(&mut self, config: SelectionConfig) -> Option<SelectionConfig> {
        let role = config.role();
        debug!(role = %role, rules = config.rules().len(), "Selection installed");
        self.selections.insert(role, config)
    }

    // ========================================================================
    // Inspection and typed accessors
    // ========================================================================

    /// Returns true if `name` has been set.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the kind of the value stored at `name`.
    pub fn kind_of(&self, name: &str) -> Option<SettingKind> {
        self.values.get(name).map(SettingValue::kind)
    }

    /// Returns all setting names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the integer stored at `name`.
    ///
    /// # Errors
    ///
    /// - `SettingError::UnknownSetting` if `name` was never set
    /// - `SettingError::WrongKind` if it holds another kind
    pub fn get_integer(&self, name: &str) -> SettingResult<i64> {
        let value = self.get(name)?;
        value
            .as_integer()
            .ok_or_else(|| wrong_kind(name, SettingKind::Integer, value))
    }

    /// Returns the text stored at `name`; errors as [`Self::get_integer`].
    pub fn get_text(&self, name: &str) -> SettingResult<&str> {
        let value = self.get(name)?;
        value
            .as_text()
            .ok_or_else(|| wrong_kind(name, SettingKind::Text, value))
    }

    /// Returns the flag stored at `name`; errors as [`Self::get_integer`].
    pub fn get_bool(&self, name: &str) -> SettingResult<bool> {
        let value = self.get(name)?;
        value
            .as_bool()
            .ok_or_else(|| wrong_kind(name, SettingKind::Bool, value))
    }

    /// Returns the compiled matcher stored at `name`.
    ///
    /// A name that still holds the pattern's source text is `WrongKind`
    /// until the pattern has been installed.
    pub fn get_pattern(&self, name: &str) -> SettingResult<&CompiledPattern> {
        let value = self.get(name)?;
        value
            .as_pattern()
            .ok_or_else(|| wrong_kind(name, SettingKind::Pattern, value))
    }
}

/// Parses the text of an integer assignment.
///
/// Surrounding whitespace is ignored. Failure is `FatalConfiguration`;
/// reporting it is left to the caller.
pub(crate) fn parse_integer(name: &str, raw: &str) -> SettingResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| SettingError::FatalConfiguration {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

fn wrong_kind(name: &str, expected: SettingKind, found: &SettingValue) -> SettingError {
    SettingError::WrongKind {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SettingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingRegistry")
            .field("values", &self.values.len())
            .field("change_log", &self.change_log)
            .field("selections", &self.selections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Unit tests
// ============================================================================
