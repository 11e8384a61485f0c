//! Credential verification.

use std::collections::HashMap;

use super::AuthError;
use crate::config::CredentialsConfig;
use crate::ratelimit::UsernameKey;

/// Checks a username/password pair.
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(true)` if the credentials are valid, `Ok(false)` if not.
    fn verify(&self, username: &UsernameKey, password: &str) -> Result<bool, AuthError>;
}

/// Verifier backed by a fixed table of passwords.
///
/// Users listed in the table must match their own password. Users not listed
/// are accepted with the shared password, if one is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<UsernameKey, String>,
    shared_password: Option<String>,
}

impl StaticCredentials {
    /// An empty table that rejects everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration.
    pub fn from_config(config: &CredentialsConfig) -> Self {
        let mut credentials = Self::new();
        for (name, password) in &config.users {
            credentials = credentials.with_user(name, password);
        }
        match &config.shared_password {
            Some(password) => credentials.with_shared_password(password),
            None => credentials,
        }
    }

    /// Add or replace a user's password.
    pub fn with_user(mut self, username: &str, password: impl Into<String>) -> Self {
        self.users.insert(UsernameKey::new(username), password.into());
        self
    }

    /// Accept this password for users not in the table.
    pub fn with_shared_password(mut self, password: impl Into<String>) -> Self {
        self.shared_password = Some(password.into());
        self
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &UsernameKey, password: &str) -> Result<bool, AuthError> {
        let expected = self.users.get(username).or(self.shared_password.as_ref());
        Ok(expected.is_some_and(|expected| expected == password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listed_user_needs_own_password() {
        let creds = StaticCredentials::new()
            .with_user("Alice", "wonderland")
            .with_shared_password("1234");
        let alice = UsernameKey::new("alice");

        assert!(creds.verify(&alice, "wonderland").unwrap());
        assert!(!creds.verify(&alice, "1234").unwrap());
    }

    #[test]
    fn test_shared_password_for_unlisted_users() {
        let creds = StaticCredentials::new().with_shared_password("1234");
        assert!(creds.verify(&UsernameKey::new("demo"), "1234").unwrap());
        assert!(!creds.verify(&UsernameKey::new("demo"), "12345").unwrap());
    }

    #[test]
    fn test_empty_table_rejects_everyone() {
        let creds = StaticCredentials::new();
        assert!(!creds.verify(&UsernameKey::new("demo"), "").unwrap());
    }

    #[test]
    fn test_from_config() {
        let config = CredentialsConfig {
            users: [("bob".to_string(), "builder".to_string())].into_iter().collect(),
            shared_password: None,
        };
        let creds = StaticCredentials::from_config(&config);
        assert!(creds.verify(&UsernameKey::new("BOB"), "builder").unwrap());
        assert!(!creds.verify(&UsernameKey::new("carol"), "builder").unwrap());
    }
}
