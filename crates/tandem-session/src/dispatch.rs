//! Name-driven application of peer requests to a setting registry.
//!
//! The `Dispatcher` is the single place where a [`PeerRequest`] turns into
//! registry calls. The in-process connection and the peer server both go
//! through it.
//!
//! # Panic-Free Guarantees
//!
//! Every failure becomes a `PeerReply::Error`; dispatch itself never fails.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use tandem_core::{
    QuoteMode, RawRule, RuleList, RuleParser, SelectionFactory, SettingError, SettingKind,
    SettingsHandle, StandardRuleParser,
};
use tandem_protocol::{from_wire, integer_text, to_wire, ErrorKind, PeerReply, PeerRequest};

/// Rule parser shared between clones of a dispatcher.
pub type SharedRuleParser = Arc<dyn RuleParser + Send + Sync>;

/// Applies requests to one process's registry.
#[derive(Clone)]
pub struct Dispatcher {
    settings: SettingsHandle,
    selections: SelectionFactory<SharedRuleParser>,
}

impl Dispatcher {
    /// Creates a dispatcher using the standard selection rule parser.
    pub fn new(settings: SettingsHandle) -> Self {
        Self::with_rule_parser(settings, Arc::new(StandardRuleParser))
    }

    pub fn with_rule_parser(settings: SettingsHandle, parser: SharedRuleParser) -> Self {
        Self {
            settings,
            selections: SelectionFactory::new(parser),
        }
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Applies `request` and returns the reply for it.
    pub fn dispatch(&self, request: PeerRequest) -> PeerReply {
        let label = request.label();
        let reply = match request {
            PeerRequest::Hello { connection_id } => {
                self.settings
                    .set("connection_number", i64::from(connection_id));
                PeerReply::welcome(connection_id)
            }

            PeerRequest::Get { name } => match self.settings.get(&name) {
                Ok(value) => PeerReply::Value {
                    value: to_wire(&value),
                },
                Err(e) => PeerReply::from(&e),
            },

            PeerRequest::Set { name, value, hint } => self.set(&name, &value, hint),

            PeerRequest::SetInteger { name, raw } => {
                ack_or_error(self.settings.set_integer(&name, &raw))
            }

            PeerRequest::GetMapEntry { name, key } => {
                let entry = self
                    .settings
                    .with(|reg| reg.get_map_entry(&name, &key).map(to_wire));
                match entry {
                    Ok(value) => PeerReply::Value { value },
                    Err(e) => PeerReply::from(&e),
                }
            }

            PeerRequest::SetMapEntry {
                name,
                key,
                value,
                hint,
            } => {
                let result = from_wire(&name, &value, hint)
                    .and_then(|value| {
                        self.settings
                            .with(|reg| reg.set_map_entry(&name, key, value))
                    });
                ack_or_error(result)
            }

            PeerRequest::InstallPattern {
                name,
                pattern,
                flags,
            } => ack_or_error(
                self.settings
                    .with(|reg| reg.install_pattern(&name, &pattern, flags)),
            ),

            PeerRequest::BuildSelection {
                source,
                rules,
                quote_mode,
                extra_lists,
            } => self.build_selection(source, &rules, quote_mode, &extra_lists),

            PeerRequest::DrainChangeLog => PeerReply::Names {
                names: self.settings.drain_change_log(),
            },

            PeerRequest::Shutdown => PeerReply::Ack,
        };

        if let PeerReply::Error { kind, message } = &reply {
            warn!(request = label, kind = ?kind, error = %message, "Request failed");
        } else {
            debug!(request = label, "Request applied");
        }
        reply
    }

    fn set(&self, name: &str, value: &serde_json::Value, hint: Option<SettingKind>) -> PeerReply {
        // Integer assignments keep set_integer's fatal routing.
        if hint == Some(SettingKind::Integer) {
            let raw = integer_text(value).unwrap_or_else(|| value.to_string());
            return ack_or_error(self.settings.set_integer(name, &raw));
        }

        match from_wire(name, value, hint) {
            Ok(value) => {
                self.settings.set(name, value);
                PeerReply::Ack
            }
            Err(e) => PeerReply::from(&e),
        }
    }

    fn build_selection(
        &self,
        source: bool,
        rules: &[RawRule],
        quote_mode: QuoteMode,
        extra_lists: &[RuleList],
    ) -> PeerReply {
        let result = self.settings.with(|reg| {
            self.selections
                .build_and_install(reg, &source, rules, quote_mode, extra_lists)
        });
        match result {
            Ok(_) => PeerReply::Ack,
            Err(e) => PeerReply::error(ErrorKind::Selection, e.to_string()),
        }
    }
}

fn ack_or_error(result: Result<(), SettingError>) -> PeerReply {
    match result {
        Ok(()) => PeerReply::Ack,
        Err(e) => PeerReply::from(&e),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_core::{CollectingSink, PatternFlags, Role, SettingRegistry, SettingValue};

    fn create_dispatcher() -> (Dispatcher, CollectingSink) {
        let sink = CollectingSink::new();
        let registry = SettingRegistry::with_defaults(Arc::new(sink.clone()));
        (Dispatcher::new(SettingsHandle::new(registry)), sink)
    }

    fn set(name: &str, value: serde_json::Value, hint: Option<SettingKind>) -> PeerRequest {
        PeerRequest::Set {
            name: name.to_string(),
            value,
            hint,
        }
    }

    #[test]
    fn test_hello_records_connection_number() {
        let (dispatcher, _) = create_dispatcher();
        let reply = dispatcher.dispatch(PeerRequest::Hello { connection_id: 3 });
        assert_eq!(reply, PeerReply::welcome(3));
        assert_eq!(
            dispatcher.settings().get("connection_number").unwrap(),
            SettingValue::Integer(3)
        );
    }

    #[test]
    fn test_get_and_set() {
        let (dispatcher, _) = create_dispatcher();
        let reply = dispatcher.dispatch(set("time_separator", json!("_"), None));
        assert_eq!(reply, PeerReply::Ack);

        let reply = dispatcher.dispatch(PeerRequest::Get {
            name: "time_separator".to_string(),
        });
        let value = match reply {
            PeerReply::Value { value } => value,
            other => panic!("expected value reply, got {other:?}"),
        };
        assert_eq!(value.kind, SettingKind::Text);
        assert_eq!(value.value, json!("_"));

        let reply = dispatcher.dispatch(PeerRequest::Get {
            name: "nonexistent".to_string(),
        });
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::UnknownSetting,
                ..
            }
        ));
    }

    #[test]
    fn test_integer_hint_uses_set_integer() {
        let (dispatcher, sink) = create_dispatcher();
        let reply = dispatcher.dispatch(set("blocksize", json!(" 65536 "), Some(SettingKind::Integer)));
        assert_eq!(reply, PeerReply::Ack);
        assert_eq!(
            dispatcher.settings().get("blocksize").unwrap(),
            SettingValue::Integer(65536)
        );

        let reply = dispatcher.dispatch(set("blocksize", json!("big"), Some(SettingKind::Integer)));
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::FatalConfiguration,
                ..
            }
        ));
        assert_eq!(sink.reports().len(), 1);
        assert_eq!(
            dispatcher.settings().get("blocksize").unwrap(),
            SettingValue::Integer(65536)
        );
    }

    #[test]
    fn test_coercion_failure_leaves_registry_unchanged() {
        let (dispatcher, sink) = create_dispatcher();
        let reply = dispatcher.dispatch(set("compression", json!("perhaps"), Some(SettingKind::Bool)));
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::Coercion,
                ..
            }
        ));
        assert_eq!(
            dispatcher.settings().get("compression").unwrap(),
            SettingValue::Bool(true)
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_map_entries() {
        let (dispatcher, _) = create_dispatcher();
        dispatcher.dispatch(set("uid_map", json!({}), Some(SettingKind::Map)));

        let reply = dispatcher.dispatch(PeerRequest::SetMapEntry {
            name: "uid_map".to_string(),
            key: "1000".to_string(),
            value: json!(2000),
            hint: None,
        });
        assert_eq!(reply, PeerReply::Ack);

        let reply = dispatcher.dispatch(PeerRequest::GetMapEntry {
            name: "uid_map".to_string(),
            key: "1000".to_string(),
        });
        let value = match reply {
            PeerReply::Value { value } => value,
            other => panic!("expected value reply, got {other:?}"),
        };
        assert_eq!(value.value, json!(2000));

        let reply = dispatcher.dispatch(PeerRequest::GetMapEntry {
            name: "uid_map".to_string(),
            key: "0".to_string(),
        });
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::KeyNotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_install_pattern() {
        let (dispatcher, _) = create_dispatcher();
        let reply = dispatcher.dispatch(PeerRequest::InstallPattern {
            name: "exclude_regexp".to_string(),
            pattern: "a.*b".to_string(),
            flags: PatternFlags::CASE_INSENSITIVE,
        });
        assert_eq!(reply, PeerReply::Ack);
        let matched = dispatcher
            .settings()
            .with(|reg| reg.get_pattern("exclude_regexp").map(|p| p.is_match("AxxB")));
        assert_eq!(matched, Ok(true));

        let reply = dispatcher.dispatch(PeerRequest::InstallPattern {
            name: "exclude_regexp".to_string(),
            pattern: "a(".to_string(),
            flags: PatternFlags::default(),
        });
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::PatternCompile,
                ..
            }
        ));
    }

    #[test]
    fn test_build_selection() {
        let (dispatcher, _) = create_dispatcher();
        let reply = dispatcher.dispatch(PeerRequest::BuildSelection {
            source: false,
            rules: vec![RawRule::new("--exclude", "/backup/tmp")],
            quote_mode: QuoteMode::default(),
            extra_lists: vec![],
        });
        assert_eq!(reply, PeerReply::Ack);
        let (mirror, source) = dispatcher.settings().with(|reg| {
            (
                reg.selection(Role::Mirror).is_some(),
                reg.selection(Role::Source).is_some(),
            )
        });
        assert!(mirror);
        assert!(!source);

        let reply = dispatcher.dispatch(PeerRequest::BuildSelection {
            source: true,
            rules: vec![RawRule::new("--bogus", "")],
            quote_mode: QuoteMode::default(),
            extra_lists: vec![],
        });
        assert!(matches!(
            reply,
            PeerReply::Error {
                kind: ErrorKind::Selection,
                ..
            }
        ));
    }

    #[test]
    fn test_drain_change_log() {
        let (dispatcher, _) = create_dispatcher();
        dispatcher.dispatch(set("a", json!(1), None));
        dispatcher.dispatch(set("b", json!(2), None));
        assert_eq!(
            dispatcher.dispatch(PeerRequest::DrainChangeLog),
            PeerReply::Names {
                names: vec!["a".to_string(), "b".to_string()]
            }
        );
        assert_eq!(
            dispatcher.dispatch(PeerRequest::DrainChangeLog),
            PeerReply::Names { names: vec![] }
        );
    }
}
