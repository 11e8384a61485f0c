//! Login flow: credential checks, sessions and throttling glued together.

mod credentials;
mod service;
mod session;

pub use credentials::{CredentialVerifier, StaticCredentials};
pub use service::{LoginOutcome, LoginService};
pub use session::{KvSessionManager, SessionManager, DEFAULT_SESSION_KEY};

use thiserror::Error;

/// Errors raised by credential backends.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential backend unavailable: {0}")]
    Unavailable(String),
}
