//! Shared handle to the process setting registry.
//!
//! The `SettingsHandle` is a cheap-to-clone reference to the single
//! registry of a process. Every access goes through one mutex, so all
//! writers are serialized and change-log order is call order even when
//! transport I/O runs on other threads.
//!
//! # Panic-Free Guarantees
//!
//! A poisoned lock is recovered rather than propagated: registry mutations
//! are single statements, so a panicking holder cannot leave the registry
//! half-updated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SettingResult;
use crate::registry::{parse_integer, SettingRegistry};
use crate::value::SettingValue;

/// Handle for reading and mutating the process setting registry.
#[derive(Clone, Debug)]
pub struct SettingsHandle {
    inner: Arc<Mutex<SettingRegistry>>,
}

impl SettingsHandle {
    /// Wraps `registry` in a new shared handle.
    pub fn new(registry: SettingRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Runs `f` with exclusive access to the registry.
    pub fn with<R>(&self, f: impl FnOnce(&mut SettingRegistry) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Returns a copy of the value of `name`.
    pub fn get(&self, name: &str) -> SettingResult<SettingValue> {
        self.lock().get(name).cloned()
    }

    /// Assigns `value` to `name` and journals the change.
    pub fn set(&self, name: impl Into<String>, value: impl Into<SettingValue>) {
        self.lock().set(name, value);
    }

    /// Coerces `raw` to an integer and assigns it; see
    /// [`SettingRegistry::set_integer`].
    ///
    /// A failure is reported to the fatal sink after the lock is released,
    /// so the sink may read this handle.
    pub fn set_integer(&self, name: &str, raw: &str) -> SettingResult<()> {
        match parse_integer(name, raw) {
            Ok(value) => {
                self.set(name, value);
                Ok(())
            }
            Err(err) => {
                let sink = self.lock().fatal_sink();
                sink.fatal(name, &err.to_string());
                Err(err)
            }
        }
    }

    /// Returns and clears the change log.
    pub fn drain_change_log(&self) -> Vec<String> {
        self.lock().drain_change_log()
    }

    /// Returns true if both handles refer to the same registry.
    pub fn ptr_eq(&self, other: &SettingsHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, SettingRegistry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(SettingRegistry::default())
    }
}
