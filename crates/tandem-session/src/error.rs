//! Error types for sessions and connections.

use thiserror::Error;

use tandem_core::{SelectionError, SettingError};
use tandem_protocol::{ProtocolVersion, VersionError};

use crate::config::ConfigError;
use crate::connection::ConnectionId;

/// Failures moving requests and replies over a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Protocol version mismatch: local {local}, peer {peer}")]
    VersionMismatch {
        local: ProtocolVersion,
        peer: ProtocolVersion,
    },

    #[error("Handshake rejected: {0}")]
    Rejected(String),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<VersionError> for TransportError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::Incompatible { got, expected } => Self::VersionMismatch {
                local: expected,
                peer: got,
            },
            VersionError::InvalidFormat(raw) => Self::ParseError(raw),
        }
    }
}

/// Errors surfaced by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A connection with this id is already registered.
    #[error("Connection {0} is already registered")]
    DuplicateConnectionId(ConnectionId),

    /// A broadcast stopped at connection `id`. Connections before it in
    /// registry order hold the new value; the rest were not contacted.
    #[error("Broadcast of {name} failed on connection {id}: {reason}")]
    Broadcast {
        id: ConnectionId,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Setting(#[from] SettingError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Returns true if the error was reported to the fatal sink.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Broadcast { .. } => true,
            Self::Setting(err) => err.is_fatal(),
            _ => false,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_error_conversion() {
        let err = TransportError::from(VersionError::Incompatible {
            got: ProtocolVersion::new(2, 0),
            expected: ProtocolVersion::CURRENT,
        });
        assert_eq!(
            err,
            TransportError::VersionMismatch {
                local: ProtocolVersion::CURRENT,
                peer: ProtocolVersion::new(2, 0),
            }
        );
    }

    #[test]
    fn test_broadcast_message() {
        let err = SessionError::Broadcast {
            id: ConnectionId::new(2),
            name: "exclude_regexp".to_string(),
            reason: "Connection closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Broadcast of exclude_regexp failed on connection 2: Connection closed"
        );
        assert!(err.is_fatal());
        assert!(!SessionError::DuplicateConnectionId(ConnectionId::LOCAL).is_fatal());
    }
}
