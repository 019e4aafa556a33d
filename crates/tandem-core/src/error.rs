//! Setting registry errors following the panic-free policy.

use thiserror::Error;

use crate::value::SettingKind;

/// Errors that can occur in setting registry operations.
///
/// `UnknownSetting`, `KeyNotFound` and `WrongKind` are recoverable: the
/// registry is untouched and the caller decides what to do.
/// `FatalConfiguration` ends the session once it reaches the fatal sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    /// The setting was never assigned (or is not a mapping, for map access).
    #[error("Unknown setting: {name}")]
    UnknownSetting { name: String },

    /// The mapping stored at `name` has no entry for `key`.
    #[error("Key {key} not found in setting {name}")]
    KeyNotFound { name: String, key: String },

    /// A value could not be coerced to an integer.
    #[error("Variable {name} must be set to an integer - received {value} instead")]
    FatalConfiguration { name: String, value: String },

    /// Pattern text failed to compile.
    #[error("Invalid pattern for {name} ({pattern}): {reason}")]
    PatternCompile {
        name: String,
        pattern: String,
        reason: String,
    },

    /// A typed accessor found a value of another kind.
    #[error("Setting {name} holds a {found} value (expected {expected})")]
    WrongKind {
        name: String,
        expected: SettingKind,
        found: SettingKind,
    },

    /// A raw value could not be coerced to the requested kind.
    #[error("Cannot coerce {value} to {expected} for setting {name}")]
    Coercion {
        name: String,
        value: String,
        expected: SettingKind,
    },
}

impl SettingError {
    /// Creates an unknown setting error.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownSetting { name: name.into() }
    }

    /// Returns true if this error must terminate the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfiguration { .. })
    }

    /// Returns the name of the setting this error refers to.
    pub fn setting_name(&self) -> &str {
        match self {
            Self::UnknownSetting { name }
            | Self::KeyNotFound { name, .. }
            | Self::FatalConfiguration { name, .. }
            | Self::PatternCompile { name, .. }
            | Self::WrongKind { name, .. }
            | Self::Coercion { name, .. } => name,
        }
    }
}

/// Result type for setting operations.
pub type SettingResult<T> = Result<T, SettingError>;
