//! The ordered set of connections in a session.

use tracing::info;

use crate::connection::{Connection, ConnectionId, ConnectionKind, LocalConnection};
use crate::error::{SessionError, SessionResult};

/// All connections of the session in registration order.
///
/// Index 0 is always the local connection, so a broadcast reaches this
/// process before any peer.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Vec<Box<dyn Connection>>,
}

impl ConnectionRegistry {
    /// Creates a registry holding only `local`.
    pub fn new(local: LocalConnection) -> Self {
        Self {
            connections: vec![Box::new(local)],
        }
    }

    /// Appends `connection`.
    ///
    /// # Errors
    ///
    /// `SessionError::DuplicateConnectionId` if a connection with the same
    /// id is already registered; the registry is unchanged.
    pub fn register(&mut self, connection: Box<dyn Connection>) -> SessionResult<()> {
        let id = connection.id();
        if self.contains(id) {
            return Err(SessionError::DuplicateConnectionId(id));
        }
        info!(id = %id, kind = %connection.kind(), "Connection registered");
        self.connections.push(connection);
        Ok(())
    }

    /// Returns the connections in order, local first.
    pub fn all(&self) -> impl Iterator<Item = &dyn Connection> + '_ {
        self.connections.iter().map(|c| &**c)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Connection>> + '_ {
        self.connections.iter_mut()
    }

    /// Ids in registry order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.all().map(|c| c.id()).collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&dyn Connection> {
        self.all().find(|c| c.id() == id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Box<dyn Connection>> {
        self.connections.iter_mut().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.all().any(|c| c.id() == id)
    }

    /// Smallest id above every registered one.
    pub fn next_id(&self) -> ConnectionId {
        let max = self.all().map(|c| c.id().get()).max().unwrap_or(0);
        ConnectionId::new(max.saturating_add(1))
    }

    /// Connections other than the local one, in order.
    pub fn remotes(&self) -> impl Iterator<Item = &dyn Connection> + '_ {
        self.all().filter(|c| c.kind() == ConnectionKind::Remote)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Always false: the local connection is never removed.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use tandem_core::SettingsHandle;
    use tandem_protocol::{PeerReply, PeerRequest};

    struct NullPeer(ConnectionId);

    impl Connection for NullPeer {
        fn id(&self) -> ConnectionId {
            self.0
        }

        fn kind(&self) -> ConnectionKind {
            ConnectionKind::Remote
        }

        fn invoke(&mut self, _request: PeerRequest) -> Result<PeerReply, TransportError> {
            Ok(PeerReply::Ack)
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(LocalConnection::new(SettingsHandle::default()))
    }

    #[test]
    fn test_local_is_first() {
        let mut reg = registry();
        reg.register(Box::new(NullPeer(ConnectionId::new(1)))).unwrap();
        reg.register(Box::new(NullPeer(ConnectionId::new(2)))).unwrap();

        assert_eq!(
            reg.ids(),
            vec![ConnectionId::LOCAL, ConnectionId::new(1), ConnectionId::new(2)]
        );
        assert_eq!(reg.all().next().unwrap().kind(), ConnectionKind::Local);
        assert_eq!(reg.remotes().count(), 2);
        assert_eq!(reg.get(ConnectionId::new(2)).unwrap().kind(), ConnectionKind::Remote);
        assert!(reg.get(ConnectionId::new(9)).is_none());
        assert_eq!(reg.next_id(), ConnectionId::new(3));
    }

    #[test]
    fn test_duplicate_registration_fails_without_mutation() {
        let mut reg = registry();
        reg.register(Box::new(NullPeer(ConnectionId::new(1)))).unwrap();

        let err = reg
            .register(Box::new(NullPeer(ConnectionId::new(1))))
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateConnectionId(id) if id == ConnectionId::new(1)));
        assert_eq!(reg.len(), 2);

        let err = reg.register(Box::new(NullPeer(ConnectionId::LOCAL))).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateConnectionId(_)));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_get_mut() {
        let mut reg = registry();
        reg.register(Box::new(NullPeer(ConnectionId::new(4)))).unwrap();
        let conn = reg.get_mut(ConnectionId::new(4)).unwrap();
        assert_eq!(conn.invoke(PeerRequest::Shutdown).unwrap(), PeerReply::Ack);
        assert!(reg.get_mut(ConnectionId::new(5)).is_none());
        assert!(!reg.is_empty());
    }
}
