//! Broadcast of compiled matchers to every connection.
//!
//! Compiled regular expressions cannot cross a process boundary, so a
//! pattern travels as its source text and each connection compiles it for
//! itself. The text is compiled here first: a pattern that does not compile
//! never reaches any connection.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use tandem_core::{CompiledPattern, FatalSink, PatternFlags, SettingError};
use tandem_protocol::{PeerReply, PeerRequest};

use crate::connection::ConnectionId;
use crate::connections::ConnectionRegistry;
use crate::error::{SessionError, SessionResult};

/// Installs a compiled matcher under one name on every connection.
#[derive(Clone)]
pub struct PatternInstaller {
    fatal: Arc<dyn FatalSink>,
}

impl PatternInstaller {
    pub fn new(fatal: Arc<dyn FatalSink>) -> Self {
        Self { fatal }
    }

    /// Compiles `pattern` and has each connection, in registry order, store
    /// its own matcher under `name`. `flags` defaults to none.
    ///
    /// Returns the number of connections that installed the matcher.
    ///
    /// # Errors
    ///
    /// - `SessionError::Setting(PatternCompile)` if the text does not
    ///   compile; no connection is contacted
    /// - `SessionError::Broadcast` if a connection fails; the failure is
    ///   reported to the fatal sink, earlier connections keep the new
    ///   matcher and later ones are not contacted
    pub fn install(
        &self,
        connections: &mut ConnectionRegistry,
        name: &str,
        pattern: &str,
        flags: Option<PatternFlags>,
    ) -> SessionResult<usize> {
        let flags = flags.unwrap_or_default();
        CompiledPattern::compile(pattern, flags).map_err(|e| SettingError::PatternCompile {
            name: name.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let mut installed = 0;
        for connection in connections.iter_mut() {
            let id = connection.id();
            let request = PeerRequest::InstallPattern {
                name: name.to_string(),
                pattern: pattern.to_string(),
                flags,
            };
            match connection.invoke(request) {
                Ok(PeerReply::Ack) => {
                    debug!(id = %id, name = %name, "Pattern installed on connection");
                    installed += 1;
                }
                Ok(PeerReply::Error { message, .. }) => return Err(self.fail(id, name, message)),
                Ok(other) => {
                    return Err(self.fail(id, name, format!("unexpected reply {other:?}")))
                }
                Err(e) => return Err(self.fail(id, name, e.to_string())),
            }
        }

        info!(name = %name, pattern = %pattern, flags = %flags, connections = installed, "Pattern broadcast");
        Ok(installed)
    }

    fn fail(&self, id: ConnectionId, name: &str, reason: String) -> SessionError {
        error!(id = %id, name = %name, reason = %reason, "Pattern broadcast failed");
        self.fatal.fatal(
            name,
            &format!("Could not install {name} on connection {id}: {reason}"),
        );
        SessionError::Broadcast {
            id,
            name: name.to_string(),
            reason,
        }
    }
}

impl fmt::Debug for PatternInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternInstaller").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionKind, LocalConnection};
    use crate::error::TransportError;
    use std::sync::Mutex;
    use tandem_core::{CollectingSink, SettingRegistry, SettingsHandle};

    /// Remote stand-in that records requests and fails on demand.
    struct ScriptedPeer {
        id: ConnectionId,
        seen: Arc<Mutex<Vec<PeerRequest>>>,
        broken: bool,
    }

    impl Connection for ScriptedPeer {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn kind(&self) -> ConnectionKind {
            ConnectionKind::Remote
        }

        fn invoke(&mut self, request: PeerRequest) -> Result<PeerReply, TransportError> {
            if self.broken {
                return Err(TransportError::Eof);
            }
            self.seen.lock().unwrap().push(request);
            Ok(PeerReply::Ack)
        }
    }

    fn setup(peers: &[(u32, bool)]) -> (ConnectionRegistry, Vec<Arc<Mutex<Vec<PeerRequest>>>>, SettingsHandle) {
        let settings = SettingsHandle::new(SettingRegistry::with_fatal_sink(Arc::new(
            CollectingSink::new(),
        )));
        let mut registry = ConnectionRegistry::new(LocalConnection::new(settings.clone()));
        let mut logs = Vec::new();
        for (id, broken) in peers {
            let seen = Arc::new(Mutex::new(Vec::new()));
            registry
                .register(Box::new(ScriptedPeer {
                    id: ConnectionId::new(*id),
                    seen: Arc::clone(&seen),
                    broken: *broken,
                }))
                .unwrap();
            logs.push(seen);
        }
        (registry, logs, settings)
    }

    #[test]
    fn test_install_reaches_every_connection() {
        let sink = CollectingSink::new();
        let installer = PatternInstaller::new(Arc::new(sink.clone()));
        let (mut registry, logs, settings) = setup(&[(1, false), (2, false)]);

        let installed = installer
            .install(&mut registry, "exclude_regexp", "a.*b", None)
            .unwrap();

        assert_eq!(installed, 3);
        assert!(settings.with(|reg| reg.get_pattern("exclude_regexp").is_ok()));
        for log in logs {
            assert_eq!(
                log.lock().unwrap().as_slice(),
                [PeerRequest::InstallPattern {
                    name: "exclude_regexp".to_string(),
                    pattern: "a.*b".to_string(),
                    flags: PatternFlags::default(),
                }]
            );
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_malformed_pattern_contacts_nobody() {
        let sink = CollectingSink::new();
        let installer = PatternInstaller::new(Arc::new(sink.clone()));
        let (mut registry, logs, settings) = setup(&[(1, false)]);

        let err = installer
            .install(&mut registry, "exclude_regexp", "(unclosed", None)
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Setting(SettingError::PatternCompile { .. })
        ));
        assert!(!settings.with(|reg| reg.contains("exclude_regexp")));
        assert!(logs[0].lock().unwrap().is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_failure_stops_broadcast_and_reports_fatal() {
        let sink = CollectingSink::new();
        let installer = PatternInstaller::new(Arc::new(sink.clone()));
        let (mut registry, logs, settings) = setup(&[(1, false), (2, true), (3, false)]);

        let err = installer
            .install(&mut registry, "no_compression_regexp", "\\.gz$", None)
            .unwrap_err();

        match err {
            SessionError::Broadcast { id, name, .. } => {
                assert_eq!(id, ConnectionId::new(2));
                assert_eq!(name, "no_compression_regexp");
            }
            other => panic!("expected broadcast error, got {other:?}"),
        }
        assert!(settings.with(|reg| reg.contains("no_compression_regexp")));
        assert_eq!(logs[0].lock().unwrap().len(), 1);
        assert!(logs[2].lock().unwrap().is_empty());

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "no_compression_regexp");
    }
}
