//! Setting values and their kind tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::CompiledPattern;

/// Kind tag of a setting value.
///
/// The kind is fixed by the variant stored, so mapping access and typed
/// accessors can check it without a separate schema. Selections are not
/// settings: they live in the registry's per-role slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Integer,
    Text,
    Bool,
    Pattern,
    Map,
    Object,
}

impl SettingKind {
    /// Returns true if values of this kind can cross a connection as plain data.
    ///
    /// Patterns are shipped as source text and recompiled by the receiver.
    pub fn is_transferable(self) -> bool {
        !matches!(self, Self::Pattern)
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Pattern => "pattern",
            Self::Map => "map",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Current value of a setting.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Integer(i64),
    Text(String),
    Bool(bool),
    Pattern(CompiledPattern),
    Map(BTreeMap<String, SettingValue>),
    /// Opaque structured data, kept as JSON.
    Object(serde_json::Value),
}

impl SettingValue {
    /// Returns the kind tag for this value.
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Integer(_) => SettingKind::Integer,
            Self::Text(_) => SettingKind::Text,
            Self::Bool(_) => SettingKind::Bool,
            Self::Pattern(_) => SettingKind::Pattern,
            Self::Map(_) => SettingKind::Map,
            Self::Object(_) => SettingKind::Object,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&CompiledPattern> {
        match self {
            Self::Pattern(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, SettingValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Creates an empty mapping value.
    pub fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Pattern(p) => write!(f, "/{}/", p.as_str()),
            Self::Map(m) => {
                write!(f, "{{")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<CompiledPattern> for SettingValue {
    fn from(p: CompiledPattern) -> Self {
        Self::Pattern(p)
    }
}

impl From<BTreeMap<String, SettingValue>> for SettingValue {
    fn from(m: BTreeMap<String, SettingValue>) -> Self {
        Self::Map(m)
    }
}
