//! TOML session configuration.
//!
//! ```toml
//! [settings]
//! blocksize = 65536
//! time_separator = "_"
//!
//! [settings.uid_map]
//! 1000 = 2000
//!
//! [[patterns]]
//! name = "exclude_regexp"
//! pattern = '\.cache/'
//! flags = "i"
//!
//! [[peers]]
//! command = "ssh"
//! args = ["backup-host", "tandem-peer"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tandem_core::{PatternFlags, SettingError, SettingKind, SettingValue};
use tandem_protocol::from_wire;

/// Errors loading or interpreting a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid flags {flags:?} for pattern {name}")]
    InvalidFlags { name: String, flags: String },

    #[error("Invalid value for setting {name}: {source}")]
    Value {
        name: String,
        #[source]
        source: SettingError,
    },
}

/// A pattern to broadcast at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub name: String,
    pub pattern: String,
    /// Flag letters, any of `imsx`.
    #[serde(default)]
    pub flags: String,
}

impl PatternEntry {
    pub fn flags(&self) -> Result<PatternFlags, ConfigError> {
        PatternFlags::from_letters(&self.flags).ok_or_else(|| ConfigError::InvalidFlags {
            name: self.name.clone(),
            flags: self.flags.clone(),
        })
    }
}

/// A peer process to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial values, assigned in name order after the defaults.
    pub settings: BTreeMap<String, toml::Value>,
    pub patterns: Vec<PatternEntry>,
    pub peers: Vec<PeerCommand>,
}

impl SessionConfig {
    /// Default location: `<config dir>/tandem/tandem.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("tandem")
            .join("tandem.toml")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            settings = config.settings.len(),
            patterns = config.patterns.len(),
            peers = config.peers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads `path`, or returns an empty configuration if it doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The `[settings]` table as typed setting values, in name order.
    ///
    /// Kinds are inferred the same way as for untyped remote assignments.
    pub fn setting_values(&self) -> Result<Vec<(String, SettingValue)>, ConfigError> {
        self.settings
            .iter()
            .map(|(name, raw)| {
                let value = serde_json::to_value(raw)
                    .map_err(|e| SettingError::Coercion {
                        name: name.clone(),
                        value: e.to_string(),
                        expected: SettingKind::Object,
                    })
                    .and_then(|json| from_wire(name, &json, None))
                    .map_err(|source| ConfigError::Value {
                        name: name.clone(),
                        source,
                    })?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}
