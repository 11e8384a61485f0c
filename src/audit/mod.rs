//! Audit events and sinks.
//!
//! The limiter and login flow report state transitions to an injected
//! [`AuditSink`]. Sinks are append-only and must never fail the caller.

mod journal;

pub use journal::{AuditFilter, KvAuditLog, DEFAULT_AUDIT_KEY, DEFAULT_MAX_ENTRIES};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    #[serde(alias = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: AuditLevel,
    pub message: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl AuditEvent {
    /// Create an event stamped at `timestamp` with a fresh id.
    ///
    /// `meta` is kept only if it is a JSON object.
    pub fn at(
        timestamp: DateTime<Utc>,
        level: AuditLevel,
        message: impl Into<String>,
        meta: Value,
    ) -> Self {
        let meta = match meta {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Self {
            id: Uuid::new_v4(),
            timestamp,
            level,
            message: message.into(),
            meta,
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Append an event. Failures are handled inside the sink.
    fn append(&self, event: AuditEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn append(&self, _event: AuditEvent) {}
}

/// Sink that forwards events to `tracing` without persisting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, event: AuditEvent) {
        emit(&event);
    }
}

/// Log an event through `tracing` at the matching level.
pub(crate) fn emit(event: &AuditEvent) {
    let meta = Value::Object(event.meta.clone());
    match event.level {
        AuditLevel::Info => {
            info!(target: "audit", id = %event.id, meta = %meta, "{}", event.message)
        }
        AuditLevel::Warning => {
            warn!(target: "audit", id = %event.id, meta = %meta, "{}", event.message)
        }
        AuditLevel::Error => {
            error!(target: "audit", id = %event.id, meta = %meta, "{}", event.message)
        }
    }
}
