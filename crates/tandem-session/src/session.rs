//! The session context object.
//!
//! A `Session` is created once at start-up and passed by reference. It owns
//! the handle to this process's registry, the ordered connection registry
//! (local first) and the broadcast machinery.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Peer failures are reported to the fatal sink and returned as errors

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use tandem_core::{
    defaults, FatalSink, PatternFlags, QuoteMode, RawRule, Role, RoleSource, RuleList,
    SelectionFactory, SettingRegistry, SettingValue, SettingsHandle, StandardRuleParser,
};
use tandem_protocol::{to_wire, PeerReply, PeerRequest};

use crate::config::{PeerCommand, SessionConfig};
use crate::connection::{Connection, ConnectionId, ConnectionKind, LocalConnection};
use crate::connections::ConnectionRegistry;
use crate::dispatch::{Dispatcher, SharedRuleParser};
use crate::error::{SessionError, SessionResult};
use crate::installer::PatternInstaller;
use crate::pipe::PipeConnection;

/// A pattern that has been broadcast, kept for peers that attach later.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BroadcastPattern {
    name: String,
    pattern: String,
    flags: PatternFlags,
}

impl BroadcastPattern {
    /// Returns true if `registry` still holds this pattern under its name.
    fn is_current(&self, registry: &SettingRegistry) -> bool {
        registry
            .get_pattern(&self.name)
            .is_ok_and(|p| p.as_str() == self.pattern && p.flags() == self.flags)
    }
}

pub struct Session {
    settings: SettingsHandle,
    connections: ConnectionRegistry,
    installer: PatternInstaller,
    selections: SelectionFactory<SharedRuleParser>,
    fatal: Arc<dyn FatalSink>,
    patterns: Vec<BroadcastPattern>,
}

impl Session {
    /// Creates a session around `registry` with only the local connection.
    ///
    /// Fatal reports from broadcasts go to the registry's own sink.
    pub fn new(registry: SettingRegistry) -> Self {
        Self::with_rule_parser(registry, Arc::new(StandardRuleParser))
    }

    pub fn with_rule_parser(registry: SettingRegistry, parser: SharedRuleParser) -> Self {
        let fatal = registry.fatal_sink();
        let settings = SettingsHandle::new(registry);
        let local = LocalConnection::with_dispatcher(Dispatcher::with_rule_parser(
            settings.clone(),
            Arc::clone(&parser),
        ));
        Self {
            settings,
            connections: ConnectionRegistry::new(local),
            installer: PatternInstaller::new(Arc::clone(&fatal)),
            selections: SelectionFactory::new(parser),
            fatal,
            patterns: Vec::new(),
        }
    }

    /// Creates a session and compiles the default compression exclusions.
    ///
    /// # Errors
    ///
    /// If `no_compression_regexp_string` is unset or does not compile.
    pub fn start(registry: SettingRegistry) -> SessionResult<Self> {
        let mut session = Self::new(registry);
        session.install_defaults()?;
        Ok(session)
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.connections
    }

    /// Assigns a setting in the local registry and journals it.
    pub fn set(&self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.settings.set(name, value);
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    /// Installs a matcher for `pattern` under `name` on every connection.
    ///
    /// See [`PatternInstaller::install`] for the failure contract.
    pub fn install_pattern(
        &mut self,
        name: &str,
        pattern: &str,
        flags: Option<PatternFlags>,
    ) -> SessionResult<usize> {
        let installed = self
            .installer
            .install(&mut self.connections, name, pattern, flags)?;

        let entry = BroadcastPattern {
            name: name.to_string(),
            pattern: pattern.to_string(),
            flags: flags.unwrap_or_default(),
        };
        self.patterns.retain(|p| p.name != entry.name);
        self.patterns.push(entry);
        Ok(installed)
    }

    /// Compiles `no_compression_regexp_string` into `no_compression_regexp`
    /// on every connection.
    pub fn install_defaults(&mut self) -> SessionResult<usize> {
        let source = self
            .settings
            .with(|reg| reg.get_text(defaults::NO_COMPRESSION_SOURCE).map(str::to_string))?;
        self.install_pattern(defaults::NO_COMPRESSION_PATTERN, &source, None)
    }

    // ========================================================================
    // Selections
    // ========================================================================

    /// Builds the selection config for the side `path` is on and stores it
    /// in this process's registry. Nothing is broadcast.
    pub fn build_selection(
        &self,
        path: &impl RoleSource,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> SessionResult<Role> {
        let role = self.settings.with(|reg| {
            self.selections
                .build_and_install(reg, path, rules, quote_mode, extra_lists)
        })?;
        Ok(role)
    }

    /// Quoting mode derived from the current settings.
    pub fn quote_mode(&self) -> QuoteMode {
        self.settings.with(|reg| QuoteMode::from_registry(reg))
    }

    // ========================================================================
    // Peers
    // ========================================================================

    /// Registers `connection` and brings its registry up to date.
    ///
    /// Every journaled setting is sent with its current value, then every
    /// pattern broadcast so far that still holds its name is installed. The
    /// change log is not drained.
    ///
    /// # Errors
    ///
    /// - `SessionError::DuplicateConnectionId`; nothing is sent
    /// - `SessionError::Broadcast` if the peer refuses or drops a replayed
    ///   request; reported to the fatal sink
    pub fn attach(&mut self, connection: Box<dyn Connection>) -> SessionResult<usize> {
        let id = connection.id();
        self.connections.register(connection)?;
        let replayed = self.replay(id)?;
        info!(id = %id, replayed, "Peer attached");
        Ok(replayed)
    }

    /// Launches a peer process and attaches it under the next free id.
    pub fn spawn_peer(&mut self, peer: &PeerCommand) -> SessionResult<ConnectionId> {
        let id = self.connections.next_id();
        let connection = PipeConnection::spawn(id, &peer.command, &peer.args)?;
        self.attach(Box::new(connection))?;
        Ok(id)
    }

    /// Applies a configuration: initial settings, then peers, then patterns.
    pub fn apply_config(&mut self, config: &SessionConfig) -> SessionResult<()> {
        self.apply_settings(config)?;
        self.spawn_peers(config)?;
        self.install_patterns(config)?;
        Ok(())
    }

    /// Assigns the `[settings]` table locally. Each assignment is journaled.
    pub fn apply_settings(&mut self, config: &SessionConfig) -> SessionResult<()> {
        for (name, value) in config.setting_values()? {
            debug!(name = %name, value = %value, "Configured setting");
            self.settings.set(name, value);
        }
        Ok(())
    }

    pub fn spawn_peers(&mut self, config: &SessionConfig) -> SessionResult<Vec<ConnectionId>> {
        config.peers.iter().map(|peer| self.spawn_peer(peer)).collect()
    }

    pub fn install_patterns(&mut self, config: &SessionConfig) -> SessionResult<()> {
        for entry in &config.patterns {
            let flags = entry.flags()?;
            self.install_pattern(&entry.name, &entry.pattern, Some(flags))?;
        }
        Ok(())
    }

    /// Asks every remote connection to stop. Returns how many acknowledged.
    pub fn shutdown(&mut self) -> usize {
        let mut acknowledged = 0;
        for connection in self.connections.iter_mut() {
            if connection.kind() == ConnectionKind::Local {
                continue;
            }
            match connection.invoke(PeerRequest::Shutdown) {
                Ok(PeerReply::Ack) => acknowledged += 1,
                Ok(other) => warn!(id = %connection.id(), reply = ?other, "Unexpected shutdown reply"),
                Err(e) => warn!(id = %connection.id(), error = %e, "Shutdown failed"),
            }
        }
        acknowledged
    }

    fn replay(&mut self, id: ConnectionId) -> SessionResult<usize> {
        let requests = self
            .settings
            .with(|reg| replay_requests(reg, &self.patterns));

        let Some(connection) = self.connections.get_mut(id) else {
            return Ok(0);
        };

        let count = requests.len();
        for (name, request) in requests {
            let reason = match connection.invoke(request) {
                Ok(PeerReply::Error { message, .. }) => message,
                Ok(reply) if reply.is_success() => continue,
                Ok(other) => format!("unexpected reply {other:?}"),
                Err(e) => e.to_string(),
            };
            error!(id = %id, name = %name, reason = %reason, "Replay failed");
            self.fatal.fatal(
                &name,
                &format!("Could not copy {name} to connection {id}: {reason}"),
            );
            return Err(SessionError::Broadcast { id, name, reason });
        }
        Ok(count)
    }
}

/// Builds the requests that bring a new peer up to `registry`.
///
/// One request per distinct journaled name, in first-journaled order, then
/// one per broadcast pattern not already covered. A broadcast pattern whose
/// name has since been given another value is skipped.
fn replay_requests(
    registry: &SettingRegistry,
    patterns: &[BroadcastPattern],
) -> Vec<(String, PeerRequest)> {
    let mut seen = HashSet::new();
    let mut requests = Vec::new();
    for name in registry.change_log() {
        if !seen.insert(name.as_str()) {
            continue;
        }
        let Ok(value) = registry.get(name) else {
            continue;
        };
        let request = match value {
            SettingValue::Pattern(p) => PeerRequest::InstallPattern {
                name: name.clone(),
                pattern: p.as_str().to_string(),
                flags: p.flags(),
            },
            other => {
                let wire = to_wire(other);
                PeerRequest::Set {
                    name: name.clone(),
                    value: wire.value,
                    hint: Some(wire.kind),
                }
            }
        };
        requests.push((name.clone(), request));
    }

    for p in patterns {
        if seen.contains(p.name.as_str()) || !p.is_current(registry) {
            continue;
        }
        requests.push((
            p.name.clone(),
            PeerRequest::InstallPattern {
                name: p.name.clone(),
                pattern: p.pattern.clone(),
                flags: p.flags,
            },
        ));
    }
    requests
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("connections", &self.connections)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{CollectingSink, SelectPath};

    fn create_session() -> (Session, CollectingSink) {
        let sink = CollectingSink::new();
        let registry = SettingRegistry::with_defaults(Arc::new(sink.clone()));
        (Session::new(registry), sink)
    }

    #[test]
    fn test_start_installs_compression_pattern() {
        let sink = CollectingSink::new();
        let session = Session::start(SettingRegistry::with_defaults(Arc::new(sink.clone()))).unwrap();
        let (gz, txt) = session.settings().with(|reg| {
            let pattern = reg.get_pattern("no_compression_regexp").unwrap();
            (pattern.is_match("backup.TAR.GZ"), pattern.is_match("notes.txt"))
        });
        assert!(gz);
        assert!(!txt);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_start_without_defaults_fails() {
        let registry = SettingRegistry::with_fatal_sink(Arc::new(CollectingSink::new()));
        let err = Session::start(registry).unwrap_err();
        assert!(matches!(err, SessionError::Setting(_)));
    }

    #[test]
    fn test_build_selection_is_local() {
        let (session, _) = create_session();
        let role = session
            .build_selection(
                &SelectPath::source("/home"),
                &[RawRule::new("--exclude", "/home/tmp")],
                session.quote_mode(),
                &[],
            )
            .unwrap();
        assert_eq!(role, Role::Source);
        assert!(session.settings().with(|reg| reg.selection(Role::Source).is_some()));
        assert!(session.settings().with(|reg| reg.change_log().is_empty()));
    }

    #[test]
    fn test_replay_requests_dedup() {
        let (session, _) = create_session();
        session.set("blocksize", 4096);
        session.set("time_separator", "_");
        session.set("blocksize", 8192);

        let requests = session.settings().with(|reg| replay_requests(reg, &[]));
        let names: Vec<&str> = requests.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["blocksize", "time_separator"]);
        assert_eq!(
            requests[0].1,
            PeerRequest::Set {
                name: "blocksize".to_string(),
                value: serde_json::json!(8192),
                hint: Some(tandem_core::SettingKind::Integer),
            }
        );
    }

    #[test]
    fn test_replay_skips_reassigned_pattern() {
        let (mut session, _) = create_session();
        session.install_pattern("x", "a.*b", None).unwrap();
        session.install_pattern("y", "c+", None).unwrap();
        session.set("x", 5);

        let requests = session
            .settings()
            .with(|reg| replay_requests(reg, &session.patterns));
        let names: Vec<&str> = requests.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert!(matches!(requests[0].1, PeerRequest::Set { .. }));
        assert!(matches!(requests[1].1, PeerRequest::InstallPattern { .. }));
    }

    #[test]
    fn test_apply_config_without_peers() {
        let (mut session, _) = create_session();
        let config = SessionConfig::parse(
            r#"
[settings]
blocksize = 65536
quoting_enabled = true

[[patterns]]
name = "exclude_regexp"
pattern = "cache/"
flags = "i"
"#,
        )
        .unwrap();

        session.apply_config(&config).unwrap();

        assert_eq!(
            session.settings().get("blocksize").unwrap(),
            SettingValue::Integer(65536)
        );
        assert!(session.quote_mode().enabled);
        assert!(session.settings().with(|reg| reg
            .get_pattern("exclude_regexp")
            .unwrap()
            .is_match("/home/me/CACHE/x")));
        assert_eq!(
            session.settings().with(|reg| reg.change_log().to_vec()),
            vec!["blocksize", "quoting_enabled"]
        );
    }

    #[test]
    fn test_bad_pattern_flags_in_config() {
        let (mut session, _) = create_session();
        let config = SessionConfig::parse(
            "[[patterns]]\nname = \"x\"\npattern = \"a\"\nflags = \"z\"\n",
        )
        .unwrap();
        let err = session.apply_config(&config).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
