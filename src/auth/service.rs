//! Login orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{CredentialVerifier, SessionManager};
use crate::audit::{AuditEvent, AuditLevel, AuditSink};
use crate::ratelimit::{FailedLoginOutcome, RateLimiter, UsernameKey};

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// Credentials matched and a session was established
    Success { username: String },
    /// The user is blocked; credentials were not checked
    Blocked {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        unlock_at: Option<DateTime<Utc>>,
    },
    /// Credentials did not match; the failure was recorded
    Failed {
        username: String,
        #[serde(flatten)]
        outcome: FailedLoginOutcome,
    },
    /// The credential backend failed
    Error { message: String },
}

impl LoginOutcome {
    /// Whether the login succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    /// Whether the user is blocked, either before this attempt or because of it.
    pub fn is_blocked(&self) -> bool {
        match self {
            LoginOutcome::Blocked { .. } => true,
            LoginOutcome::Failed { outcome, .. } => outcome.blocked,
            _ => false,
        }
    }
}

/// Runs the login flow against a limiter, a verifier and a session manager.
pub struct LoginService {
    limiter: Arc<RateLimiter>,
    verifier: Arc<dyn CredentialVerifier>,
    sessions: Arc<dyn SessionManager>,
    audit: Arc<dyn AuditSink>,
}

impl LoginService {
    /// Create a login service.
    pub fn new(
        limiter: Arc<RateLimiter>,
        verifier: Arc<dyn CredentialVerifier>,
        sessions: Arc<dyn SessionManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            limiter,
            verifier,
            sessions,
            audit,
        }
    }

    /// The underlying limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Attempt a login.
    ///
    /// A blocked user never reaches the credential check.
    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str) -> LoginOutcome {
        let key = UsernameKey::new(username);

        let decision = self.limiter.can_attempt(&key);
        if !decision.allowed {
            self.record(
                AuditLevel::Warning,
                "login_blocked_attempt",
                json!({
                    "username": key.as_str(),
                    "reason": decision.reason,
                    "unlockAt": decision.unlock_at.map(|t| t.to_rfc3339()),
                }),
            );
            return LoginOutcome::Blocked {
                username: key.to_string(),
                unlock_at: decision.unlock_at,
            };
        }

        match self.verifier.verify(&key, password) {
            Ok(true) => {
                self.limiter.reset_attempts(&key);
                self.sessions.establish(&key);
                self.record(
                    AuditLevel::Info,
                    "user_login_success",
                    json!({ "username": key.as_str() }),
                );
                info!(username = %key, "Login succeeded");
                LoginOutcome::Success {
                    username: key.to_string(),
                }
            }
            Ok(false) => {
                let outcome = self.limiter.record_failed_login(&key);
                self.record(
                    AuditLevel::Warning,
                    "user_login_failed",
                    json!({
                        "username": key.as_str(),
                        "attempts_15min": outcome.attempts_15m,
                        "blocked": outcome.blocked,
                        "blockedUntil": outcome.blocked_until.map(|t| t.to_rfc3339()),
                    }),
                );
                LoginOutcome::Failed {
                    username: key.to_string(),
                    outcome,
                }
            }
            Err(e) => {
                warn!(username = %key, error = %e, "Login flow failed");
                self.record(
                    AuditLevel::Error,
                    "login_flow_error",
                    json!({ "username": key.as_str(), "error": e.to_string() }),
                );
                LoginOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// End the current session. Returns the user that was logged in, if any.
    pub fn logout(&self) -> Option<String> {
        let user = self.sessions.current();
        self.sessions.clear();
        self.record(
            AuditLevel::Info,
            "user_logged_out",
            json!({ "username": user }),
        );
        user
    }

    /// The user with an active session, if any.
    pub fn current_user(&self) -> Option<String> {
        self.sessions.current()
    }

    fn record(&self, level: AuditLevel, message: &str, meta: Value) {
        let now = self.limiter.clock().now();
        self.audit.append(AuditEvent::at(now, level, message, meta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, KvAuditLog};
    use crate::auth::{AuthError, KvSessionManager, StaticCredentials};
    use crate::clock::MockClock;
    use crate::ratelimit::{BlockReason, LimiterConfig};
    use crate::store::{AttemptStore, MemoryKvStore};
    use chrono::{Duration, TimeZone};

    struct OfflineVerifier;

    impl CredentialVerifier for OfflineVerifier {
        fn verify(&self, _username: &UsernameKey, _password: &str) -> Result<bool, AuthError> {
            Err(AuthError::Unavailable("directory timeout".to_string()))
        }
    }

    struct Fixture {
        service: LoginService,
        clock: MockClock,
        audit: Arc<KvAuditLog>,
    }

    fn fixture_with(verifier: Arc<dyn CredentialVerifier>) -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let clock = MockClock::new(start);
        let kv = Arc::new(MemoryKvStore::new());
        let audit = Arc::new(KvAuditLog::new(kv.clone()));

        let limiter = RateLimiter::new(AttemptStore::new(kv.clone()), LimiterConfig::default())
            .with_clock(Arc::new(clock.clone()))
            .with_audit_sink(audit.clone());
        let sessions = KvSessionManager::new(kv)
            .with_clock(Arc::new(clock.clone()))
            .with_audit_sink(audit.clone());

        Fixture {
            service: LoginService::new(
                Arc::new(limiter),
                verifier,
                Arc::new(sessions),
                audit.clone(),
            ),
            clock,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(StaticCredentials::new().with_shared_password("1234")))
    }

    fn count(audit: &KvAuditLog, message: &str) -> usize {
        audit
            .search(&AuditFilter {
                level: None,
                contains: Some(message.to_string()),
            })
            .iter()
            .filter(|e| e.message == message)
            .count()
    }

    #[test]
    fn test_successful_login_establishes_session() {
        let f = fixture();
        let outcome = f.service.login(" Alice ", "1234");

        assert_eq!(
            outcome,
            LoginOutcome::Success {
                username: "alice".to_string()
            }
        );
        assert!(outcome.is_success());
        assert_eq!(f.service.current_user().as_deref(), Some("alice"));
        assert_eq!(count(&f.audit, "user_login_success"), 1);
        assert_eq!(count(&f.audit, "session_set"), 1);
    }

    #[test]
    fn test_failed_logins_block_and_skip_credential_check() {
        let f = fixture();
        for _ in 0..4 {
            let outcome = f.service.login("alice", "wrong");
            assert!(!outcome.is_blocked());
        }

        let outcome = f.service.login("alice", "wrong");
        match &outcome {
            LoginOutcome::Failed { outcome, .. } => {
                assert!(outcome.blocked);
                assert_eq!(outcome.block_reason, Some(BlockReason::Tier15Min));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Even the right password is refused while blocked.
        f.clock.advance(Duration::minutes(1));
        let outcome = f.service.login("alice", "1234");
        assert!(matches!(outcome, LoginOutcome::Blocked { .. }));
        assert!(outcome.is_blocked());
        assert_eq!(count(&f.audit, "login_blocked_attempt"), 1);
        let blocked = f.audit.search(&AuditFilter {
            level: None,
            contains: Some("login_blocked_attempt".to_string()),
        });
        assert_eq!(blocked[0].meta["reason"], json!("temporarily_blocked"));
        assert_eq!(count(&f.audit, "user_login_failed"), 5);
        assert_eq!(f.service.current_user(), None);
    }

    #[test]
    fn test_success_after_block_expires_resets_attempts() {
        let f = fixture();
        for _ in 0..5 {
            f.service.login("alice", "wrong");
        }

        f.clock.advance(Duration::minutes(15));
        assert!(f.service.login("alice", "1234").is_success());
        assert!(f.service.limiter().snapshot().is_empty());
        assert_eq!(count(&f.audit, "reset_attempts"), 1);
    }

    #[test]
    fn test_verifier_error_is_contained() {
        let f = fixture_with(Arc::new(OfflineVerifier));
        let outcome = f.service.login("alice", "1234");

        assert!(matches!(outcome, LoginOutcome::Error { .. }));
        assert_eq!(count(&f.audit, "login_flow_error"), 1);
        assert!(f.service.limiter().snapshot().is_empty());
    }

    #[test]
    fn test_logout_clears_session() {
        let f = fixture();
        f.service.login("alice", "1234");

        assert_eq!(f.service.logout().as_deref(), Some("alice"));
        assert_eq!(f.service.current_user(), None);
        assert_eq!(f.service.logout(), None);
        assert_eq!(count(&f.audit, "user_logged_out"), 2);
    }

    #[test]
    fn test_outcome_serialization() {
        let f = fixture();
        let outcome = f.service.login("alice", "wrong");
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["username"], json!("alice"));
        assert_eq!(value["attempts_15m"], json!(1));
        assert_eq!(value["blocked"], json!(false));
    }
}
