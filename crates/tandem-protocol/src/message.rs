//! Request and reply messages exchanged with peers.
//!
//! Every request is wrapped in a [`RequestEnvelope`] carrying the sender's
//! protocol version. A peer answers each request with exactly one
//! [`PeerReply`] line, in order.

use serde::{Deserialize, Serialize};

use tandem_core::{PatternFlags, QuoteMode, RawRule, RuleList, SettingError, SettingKind};

use crate::coerce::WireValue;
use crate::version::ProtocolVersion;

/// Operations a connection can be asked to perform on its own registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRequest {
    /// Handshake; assigns the peer its connection number.
    Hello { connection_id: u32 },

    /// Read a setting.
    Get { name: String },

    /// Assign a setting. Without a hint the kind is inferred from the JSON.
    Set {
        name: String,
        value: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<SettingKind>,
    },

    /// Assign a setting that must be an integer.
    SetInteger { name: String, raw: String },

    /// Read one entry of a mapping setting.
    GetMapEntry { name: String, key: String },

    /// Write one entry of a mapping setting.
    SetMapEntry {
        name: String,
        key: String,
        value: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<SettingKind>,
    },

    /// Compile `pattern` locally and store the matcher under `name`.
    InstallPattern {
        name: String,
        pattern: String,
        #[serde(default)]
        flags: PatternFlags,
    },

    /// Build the selection config for one side from raw rule arguments.
    BuildSelection {
        source: bool,
        rules: Vec<RawRule>,
        #[serde(default)]
        quote_mode: QuoteMode,
        #[serde(default)]
        extra_lists: Vec<RuleList>,
    },

    /// Return and clear the change log.
    DrainChangeLog,

    /// Stop serving after acknowledging.
    Shutdown,
}

impl PeerRequest {
    /// Short name of the request type, for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::SetInteger { .. } => "set_integer",
            Self::GetMapEntry { .. } => "get_map_entry",
            Self::SetMapEntry { .. } => "set_map_entry",
            Self::InstallPattern { .. } => "install_pattern",
            Self::BuildSelection { .. } => "build_selection",
            Self::DrainChangeLog => "drain_change_log",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub request: PeerRequest,
}

impl RequestEnvelope {
    /// Wraps `request` with the current protocol version.
    pub fn new(request: PeerRequest) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            request,
        }
    }
}

/// Category of a failed request, so callers can react without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownSetting,
    KeyNotFound,
    FatalConfiguration,
    PatternCompile,
    WrongKind,
    Coercion,
    Selection,
    Protocol,
}

impl From<&SettingError> for ErrorKind {
    fn from(err: &SettingError) -> Self {
        match err {
            SettingError::UnknownSetting { .. } => Self::UnknownSetting,
            SettingError::KeyNotFound { .. } => Self::KeyNotFound,
            SettingError::FatalConfiguration { .. } => Self::FatalConfiguration,
            SettingError::PatternCompile { .. } => Self::PatternCompile,
            SettingError::WrongKind { .. } => Self::WrongKind,
            SettingError::Coercion { .. } => Self::Coercion,
        }
    }
}

/// Replies sent by a connection, one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerReply {
    /// Handshake accepted.
    Welcome {
        protocol_version: ProtocolVersion,
        connection_id: u32,
    },

    /// Handshake refused.
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// The request was applied.
    Ack,

    /// A setting value.
    Value { value: WireValue },

    /// Setting names, in change-log order.
    Names { names: Vec<String> },

    /// The request failed; the peer's registry is unchanged.
    Error { kind: ErrorKind, message: String },
}

impl PeerReply {
    pub fn welcome(connection_id: u32) -> Self {
        Self::Welcome {
            protocol_version: ProtocolVersion::CURRENT,
            connection_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns true for replies that report success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. } | Self::Rejected { .. })
    }
}

impl From<&SettingError> for PeerReply {
    fn from(err: &SettingError) -> Self {
        Self::error(ErrorKind::from(err), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_format() {
        let envelope = RequestEnvelope::new(PeerRequest::Set {
            name: "blocksize".to_string(),
            value: json!(4096),
            hint: Some(SettingKind::Integer),
        });
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            encoded,
            json!({
                "protocol_version": {"major": 1, "minor": 0},
                "type": "set",
                "name": "blocksize",
                "value": 4096,
                "hint": "integer",
            })
        );
    }

    #[test]
    fn test_optional_fields_default() {
        let raw = r#"{"protocol_version":{"major":1,"minor":0},"type":"install_pattern","name":"x","pattern":"a.*b"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(
            envelope.request,
            PeerRequest::InstallPattern {
                name: "x".to_string(),
                pattern: "a.*b".to_string(),
                flags: PatternFlags::default(),
            }
        );

        let raw = r#"{"protocol_version":{"major":1,"minor":0},"type":"set","name":"x","value":"y"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(raw).unwrap();
        assert!(matches!(envelope.request, PeerRequest::Set { hint: None, .. }));
    }

    #[test]
    fn test_unit_requests_decode() {
        let raw = r#"{"protocol_version":{"major":1,"minor":0},"type":"drain_change_log"}"#;
        let envelope: RequestEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.request, PeerRequest::DrainChangeLog);
        assert_eq!(envelope.request.label(), "drain_change_log");
    }

    #[test]
    fn test_error_reply_from_setting_error() {
        let reply = PeerReply::from(&SettingError::unknown("resume"));
        assert_eq!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::UnknownSetting,
                message: "Unknown setting: resume".to_string(),
            }
        );
        assert!(!reply.is_success());
        assert!(PeerReply::Ack.is_success());
    }

    #[test]
    fn test_reply_wire_format() {
        let encoded = serde_json::to_string(&PeerReply::Ack).unwrap();
        assert_eq!(encoded, r#"{"type":"ack"}"#);

        let encoded = serde_json::to_value(PeerReply::welcome(2)).unwrap();
        assert_eq!(encoded["type"], "welcome");
        assert_eq!(encoded["connection_id"], 2);
    }
}
