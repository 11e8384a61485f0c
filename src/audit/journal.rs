//! Persistent audit log kept in a key-value store.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use super::{emit, AuditEvent, AuditLevel, AuditSink};
use crate::store::{KvStore, StoreError};

/// Storage key holding the audit array.
pub const DEFAULT_AUDIT_KEY: &str = "st_audit_v1";

/// Default number of retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Criteria for [`KvAuditLog::search`]. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only events at exactly this level
    pub level: Option<AuditLevel>,
    /// Only events whose message contains this text (case-insensitive)
    pub contains: Option<String>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if self.level.is_some_and(|level| level != event.level) {
            return false;
        }
        match &self.contains {
            Some(needle) => event
                .message
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Audit sink persisting events as a JSON array under one key.
///
/// Only the most recent `max_entries` events are kept. Every appended event
/// is also logged through `tracing`.
pub struct KvAuditLog {
    kv: Arc<dyn KvStore>,
    key: String,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl KvAuditLog {
    /// Create a log under [`DEFAULT_AUDIT_KEY`] retaining [`DEFAULT_MAX_ENTRIES`].
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            key: DEFAULT_AUDIT_KEY.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            write_lock: Mutex::new(()),
        }
    }

    /// Use a custom storage key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Retain at most `max_entries` events (at least one).
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Every retained event, oldest first.
    pub fn all(&self) -> Vec<AuditEvent> {
        self.read().unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "Failed to read audit log");
            Vec::new()
        })
    }

    /// Retained events matching `filter`, oldest first.
    pub fn search(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.all().into_iter().filter(|e| filter.matches(e)).collect()
    }

    /// Remove every retained event. Returns `false` if the store failed.
    pub fn clear(&self) -> bool {
        let _guard = self.write_lock.lock();
        match self.kv.delete(&self.key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to clear audit log");
                false
            }
        }
    }

    fn read(&self) -> Result<Vec<AuditEvent>, StoreError> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(Vec::new());
        };

        // Entries that do not decode are dropped individually.
        let events = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => {
                warn!(key = %self.key, "Audit log is not a JSON array; treating as empty");
                Vec::new()
            }
        };
        Ok(events)
    }

    fn write(&self, events: &[AuditEvent]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(events)
            .map_err(|e| StoreError::Unavailable(format!("cannot encode audit log: {}", e)))?;
        self.kv.set(&self.key, &raw)
    }
}

impl AuditSink for KvAuditLog {
    fn append(&self, event: AuditEvent) {
        emit(&event);

        let _guard = self.write_lock.lock();
        let result = self.read().and_then(|mut events| {
            events.push(event);
            if events.len() > self.max_entries {
                let excess = events.len() - self.max_entries;
                events.drain(..excess);
            }
            self.write(&events)
        });

        if let Err(e) = result {
            warn!(key = %self.key, error = %e, "Failed to append audit event");
        }
    }
}
