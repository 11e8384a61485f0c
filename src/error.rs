//! Error types for the Loginguard crate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Loginguard operations.
#[derive(Error, Debug)]
pub enum LoginGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Loginguard operations.
pub type Result<T> = std::result::Result<T, LoginGuardError>;
