//! Key-value storage for throttle state, sessions and audit entries.
//!
//! Every piece of durable state is a UTF-8 string stored under a
//! well-known key. [`MemoryKvStore`] keeps it in process memory and
//! [`FileKvStore`] keeps one file per key in a data directory.

mod attempts;
mod file;
mod memory;

pub use attempts::{AttemptStore, DEFAULT_ATTEMPTS_KEY};
pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by key-value stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A string key-value store.
///
/// Implementations must be safe to share between threads. Reads of a missing
/// key return `Ok(None)` and deleting a missing key succeeds.
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any prior value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
