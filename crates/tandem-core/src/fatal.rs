//! Fatal error reporting.
//!
//! Some failures leave the session in a state it cannot continue from: an
//! integer setting that received garbage, or a broadcast that reached only
//! part of the peers. Those are handed to a [`FatalSink`], which reports the
//! message and ends the session.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::error;

/// Receiver of unrecoverable session errors.
pub trait FatalSink: Send + Sync {
    /// Reports a fatal error concerning `name`.
    ///
    /// Implementations are expected to terminate the session. The caller
    /// still returns an error afterwards for sinks that do not.
    ///
    /// Reports made through [`crate::SettingsHandle`] arrive with the
    /// registry unlocked. A report from [`crate::SettingRegistry::set_integer`]
    /// called inside [`crate::SettingsHandle::with`] arrives with the lock
    /// held, and the sink must not lock that handle again.
    fn fatal(&self, name: &str, message: &str);
}

/// Default sink: logs the error and exits the process with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitSink;

impl FatalSink for ExitSink {
    fn fatal(&self, name: &str, message: &str) {
        error!(setting = %name, "{message}");
        eprintln!("Fatal Error: {message}");
        std::process::exit(1);
    }
}

/// Sink that records fatal reports instead of exiting.
///
/// Used by embedders that manage termination themselves, and by tests.
#[derive(Clone, Default)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all `(name, message)` pairs reported so far.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl FatalSink for CollectingSink {
    fn fatal(&self, name: &str, message: &str) {
        error!(setting = %name, "{message}");
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), message.to_string()));
    }
}

impl fmt::Debug for CollectingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingSink")
            .field("reports", &self.reports().len())
            .finish()
    }
}
