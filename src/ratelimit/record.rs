//! Per-user attempt record and its persisted JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Recent failed-attempt timestamps and an optional block expiry for one user.
///
/// Persisted as `{"attempts": [millis...], "blockedUntil": millis | null}`.
/// Decoding is lenient: non-numeric attempts are skipped, a non-array
/// `attempts` becomes empty, and a non-numeric `blockedUntil` is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Failed attempt instants in insertion (chronological) order
    #[serde(default, with = "millis_list")]
    pub attempts: Vec<DateTime<Utc>>,
    /// When present and in the future, the user is blocked until this instant
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "lenient_millis"
    )]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the record carries no attempts and no block.
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty() && self.blocked_until.is_none()
    }

    /// Drop every attempt older than `cutoff`.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.attempts.retain(|ts| *ts >= cutoff);
    }

    /// Count attempts at or after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.attempts.iter().filter(|ts| **ts >= since).count()
    }

    /// The block expiry if it is still in the future at `now`.
    pub fn active_block(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.blocked_until.filter(|until| *until > now)
    }

    /// Clear `blocked_until` if it has already expired at `now`.
    pub fn clear_expired_block(&mut self, now: DateTime<Utc>) {
        if matches!(self.blocked_until, Some(until) if until <= now) {
            self.blocked_until = None;
        }
    }

    /// Encode into the persisted JSON shape.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Decode from the persisted JSON shape. Anything but an object is empty.
    pub fn from_json(value: &Value) -> Self {
        Self::deserialize(value).unwrap_or_default()
    }
}

fn millis_to_instant(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value.as_i64() {
        Some(ms) => ms,
        None => value.as_f64().filter(|ms| ms.is_finite())? as i64,
    };
    DateTime::from_timestamp_millis(millis)
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(millis_to_instant(&value))
}

mod millis_list {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(attempts: &[DateTime<Utc>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(attempts.iter().map(|ts| ts.timestamp_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let attempts = match Value::deserialize(deserializer)? {
            Value::Array(items) => items.iter().filter_map(super::millis_to_instant).collect(),
            _ => Vec::new(),
        };
        Ok(attempts)
    }
}
