//! Protocol versioning for mixed-version sessions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Version of the peer protocol, as `major.minor`.
///
/// - Major bump: requests or replies changed incompatibly
/// - Minor bump: new requests were added; older peers reject them individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Version spoken by this build.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses a version string like "1.0".
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }

    /// Peers can talk when their major versions agree.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Checks compatibility, describing the mismatch on failure.
    pub fn check(&self, other: &ProtocolVersion) -> Result<(), VersionError> {
        if self.is_compatible_with(other) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                got: *other,
                expected: *self,
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Incompatible protocol version: got {got}, expected {expected}")]
    Incompatible {
        got: ProtocolVersion,
        expected: ProtocolVersion,
    },
}
