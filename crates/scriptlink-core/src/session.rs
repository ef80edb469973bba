//! Session registration.
//!
//! Each subsystem (HTTP server, MQTT client) allows at most one active
//! session at a time. Rather than ambient global handles, a [`SessionSlot`]
//! is the single registration point: starting a new session displaces the
//! previous one, which the caller then tears down explicitly.

use std::sync::{Mutex, PoisonError};

/// Holder for at most one active session of a subsystem type.
pub struct SessionSlot<S> {
    inner: Mutex<Option<S>>,
}

impl<S> SessionSlot<S> {
    /// Create an empty slot.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Install a session, returning the displaced one if any.
    ///
    /// The displaced session is handed back rather than dropped in place so
    /// the caller can run its teardown path (stop, drain) first.
    pub fn install(&self, session: S) -> Option<S> {
        self.lock().replace(session)
    }

    /// Remove and return the active session, if any.
    pub fn take(&self) -> Option<S> {
        self.lock().take()
    }

    /// Whether a session is currently active.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `f` against the active session, if any.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}
