//! Attempt records keyed by normalized username.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{KvStore, StoreError};
use crate::ratelimit::{AttemptRecord, UsernameKey};

/// Storage key holding the attempt map.
pub const DEFAULT_ATTEMPTS_KEY: &str = "st_auth_attempts_v1";

/// Durable map from normalized username to [`AttemptRecord`].
///
/// All records live in a single JSON object under one key of the backing
/// [`KvStore`]. Reads never fail: a missing, unparsable or oddly shaped blob
/// is an empty map. Writes are best-effort and only logged on failure.
pub struct AttemptStore {
    kv: Arc<dyn KvStore>,
    key: String,
}

impl AttemptStore {
    /// Create a store under [`DEFAULT_ATTEMPTS_KEY`].
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_key(kv, DEFAULT_ATTEMPTS_KEY)
    }

    /// Create a store under a custom storage key.
    pub fn with_key(kv: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// The storage key the attempt map is kept under.
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Load a record, surfacing storage faults.
    ///
    /// Malformed data is still reported as an empty record; only a failing
    /// backend produces an error.
    pub fn try_load(&self, username: &UsernameKey) -> Result<AttemptRecord, StoreError> {
        let all = self.read_all()?;
        Ok(all
            .get(username.as_str())
            .map(AttemptRecord::from_json)
            .unwrap_or_default())
    }

    /// Load a record, or a fresh one if none exists or storage fails.
    pub fn load(&self, username: &UsernameKey) -> AttemptRecord {
        self.try_load(username).unwrap_or_else(|e| {
            warn!(username = %username, error = %e, "Failed to read attempt store");
            AttemptRecord::new()
        })
    }

    /// Persist a record, replacing that user's previous entry.
    pub fn save(&self, username: &UsernameKey, record: &AttemptRecord) {
        let result = self.read_all().and_then(|mut all| {
            all.insert(username.as_str().to_string(), record.to_json());
            self.write_all(&all)
        });

        if let Err(e) = result {
            warn!(username = %username, error = %e, "Failed to save attempt record");
        }
    }

    /// Remove a record. Returns whether a record existed.
    pub fn delete(&self, username: &UsernameKey) -> bool {
        let result = self.read_all().and_then(|mut all| {
            if all.remove(username.as_str()).is_some() {
                self.write_all(&all).map(|_| true)
            } else {
                Ok(false)
            }
        });

        result.unwrap_or_else(|e| {
            warn!(username = %username, error = %e, "Failed to delete attempt record");
            false
        })
    }

    /// Every stored record, for administrative inspection.
    pub fn load_all_raw(&self) -> BTreeMap<String, AttemptRecord> {
        match self.read_all() {
            Ok(all) => all
                .iter()
                .map(|(name, value)| (name.clone(), AttemptRecord::from_json(value)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read attempt store");
                BTreeMap::new()
            }
        }
    }

    fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(Map::new());
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                debug!(key = %self.key, "Attempt store is not a JSON object; treating as empty");
                Ok(Map::new())
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Attempt store is not valid JSON; treating as empty");
                Ok(Map::new())
            }
        }
    }

    fn write_all(&self, all: &Map<String, Value>) -> Result<(), StoreError> {
        // Serializing a Map<String, Value> cannot fail.
        let raw = Value::Object(all.clone()).to_string();
        self.kv.set(&self.key, &raw)
    }
}
