//! Session tracking for the authenticated user.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::audit::{AuditEvent, AuditLevel, AuditSink, NoopAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::ratelimit::UsernameKey;
use crate::store::KvStore;

/// Storage key holding the current session's username.
pub const DEFAULT_SESSION_KEY: &str = "st_session_demo";

/// Establishes and clears the authenticated session.
///
/// Operations are best-effort and never fail the caller.
pub trait SessionManager: Send + Sync {
    /// Mark `username` as the authenticated user.
    fn establish(&self, username: &UsernameKey);

    /// End the current session, if any.
    fn clear(&self);

    /// The authenticated user, if any.
    fn current(&self) -> Option<String>;
}

/// Single-user session stored under one key of a [`KvStore`].
pub struct KvSessionManager {
    kv: Arc<dyn KvStore>,
    key: String,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl KvSessionManager {
    /// Create a session manager under [`DEFAULT_SESSION_KEY`].
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            key: DEFAULT_SESSION_KEY.to_string(),
            audit: Arc::new(NoopAuditSink),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Use a custom storage key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Report session changes to `audit`.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the clock used to stamp audit events.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl SessionManager for KvSessionManager {
    fn establish(&self, username: &UsernameKey) {
        match self.kv.set(&self.key, username.as_str()) {
            Ok(()) => self.audit.append(AuditEvent::at(
                self.clock.now(),
                AuditLevel::Info,
                "session_set",
                json!({ "username": username.as_str() }),
            )),
            Err(e) => warn!(username = %username, error = %e, "Failed to store session"),
        }
    }

    fn clear(&self) {
        match self.kv.delete(&self.key) {
            Ok(()) => self.audit.append(AuditEvent::at(
                self.clock.now(),
                AuditLevel::Info,
                "session_cleared",
                json!({}),
            )),
            Err(e) => warn!(error = %e, "Failed to clear session"),
        }
    }

    fn current(&self) -> Option<String> {
        match self.kv.get(&self.key) {
            Ok(user) => user.filter(|u| !u.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read session");
                None
            }
        }
    }
}
