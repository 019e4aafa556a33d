//! The connection contract and the in-process connection.
//!
//! A connection is one endpoint of the session that owns its own setting
//! registry. The controller talks to every endpoint through the same
//! [`Connection::invoke`] call, whether it lives in this process or behind
//! a pipe.

use std::fmt;

use serde::{Deserialize, Serialize};

use tandem_core::SettingsHandle;
use tandem_protocol::{PeerReply, PeerRequest};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;

/// Identifier of a connection within a session. The local connection is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u32);

impl ConnectionId {
    pub const LOCAL: ConnectionId = ConnectionId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// This process.
    Local,
    /// Another process reached over a transport.
    Remote,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// An endpoint that can apply peer requests to its registry.
///
/// `invoke` is blocking: it returns once the endpoint has applied the
/// request (or failed to) and replied. A `PeerReply::Error` means the
/// endpoint refused the request; `Err` means the request could not be
/// delivered or its reply could not be read.
pub trait Connection: Send {
    fn id(&self) -> ConnectionId;

    fn kind(&self) -> ConnectionKind;

    fn invoke(&mut self, request: PeerRequest) -> Result<PeerReply, TransportError>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// The connection to this process's own registry.
///
/// Requests are applied directly by a [`Dispatcher`], the same one the peer
/// server uses, so the local endpoint and remote endpoints follow one
/// contract.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    dispatcher: Dispatcher,
}

impl LocalConnection {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            dispatcher: Dispatcher::new(settings),
        }
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn settings(&self) -> &SettingsHandle {
        self.dispatcher.settings()
    }
}

impl Connection for LocalConnection {
    fn id(&self) -> ConnectionId {
        ConnectionId::LOCAL
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Local
    }

    fn invoke(&mut self, request: PeerRequest) -> Result<PeerReply, TransportError> {
        Ok(self.dispatcher.dispatch(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_core::{CollectingSink, SettingRegistry, SettingValue};

    #[test]
    fn test_local_connection_applies_to_shared_registry() {
        let settings = SettingsHandle::new(SettingRegistry::with_fatal_sink(Arc::new(
            CollectingSink::new(),
        )));
        let mut local = LocalConnection::new(settings.clone());

        assert_eq!(local.id(), ConnectionId::LOCAL);
        assert_eq!(local.kind(), ConnectionKind::Local);

        let reply = local
            .invoke(PeerRequest::Set {
                name: "preserve_atime".to_string(),
                value: serde_json::json!(true),
                hint: None,
            })
            .unwrap();
        assert_eq!(reply, PeerReply::Ack);
        assert_eq!(settings.get("preserve_atime").unwrap(), SettingValue::Bool(true));
        assert!(local.settings().ptr_eq(&settings));
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(3).to_string(), "3");
        assert_eq!(ConnectionId::LOCAL.get(), 0);
        assert_eq!(serde_json::to_string(&ConnectionId::new(7)).unwrap(), "7");
    }
}
