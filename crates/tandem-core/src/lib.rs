//! Tandem Core - typed settings shared across a backup session
//!
//! This crate provides the per-process state every tandem connection keeps:
//! the name-keyed [`SettingRegistry`] with its change journal, compiled
//! [`CompiledPattern`] matchers, and the role-specific [`SelectionConfig`]
//! slots built by [`SelectionFactory`].
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod defaults;
pub mod error;
pub mod fatal;
pub mod handle;
pub mod pattern;
pub mod registry;
pub mod selection;
pub mod value;

// Re-exports for convenience
pub use error::{SettingError, SettingResult};
pub use fatal::{CollectingSink, ExitSink, FatalSink};
pub use handle::SettingsHandle;
pub use pattern::{CompiledPattern, PatternFlags};
pub use registry::SettingRegistry;
pub use selection::{
    QuoteMode, RawRule, Role, RoleSource, RuleList, RuleParser, SelectPath, SelectionConfig,
    SelectionError, SelectionFactory, SelectionRule, StandardRuleParser,
};
pub use value::{SettingKind, SettingValue};
