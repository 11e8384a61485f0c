//! Core login-attempt limiter.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, trace, warn};

use super::key::UsernameKey;
use super::record::AttemptRecord;
use super::rules::{BlockReason, FailureMode, LimiterConfig, Tier, TierPrecedence};
use crate::audit::{AuditEvent, AuditLevel, AuditSink, NoopAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::store::AttemptStore;

/// Why [`RateLimiter::can_attempt`] denied an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The user has an active block
    TemporarilyBlocked,
    /// The attempt store could not be read under `fail_closed`
    StoreUnavailable,
}

/// Result of [`RateLimiter::can_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptDecision {
    /// Whether a login attempt may proceed
    pub allowed: bool,
    /// Why the attempt was denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// When a blocked user is unblocked, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_at: Option<DateTime<Utc>>,
}

impl AttemptDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            unlock_at: None,
        }
    }

    fn deny(reason: DenyReason, unlock_at: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            unlock_at,
        }
    }
}

/// Result of [`RateLimiter::record_failed_login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailedLoginOutcome {
    /// Attempts within the short window, including this one
    pub attempts_15m: usize,
    /// Attempts within the long window, including this one
    pub attempts_1h: usize,
    /// Whether this attempt triggered a block
    pub blocked: bool,
    /// Which tier triggered the block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    /// Block expiry stored on the record after this attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Two-tier sliding-window limiter over an [`AttemptStore`].
///
/// The limiter is `Sync` and can be shared behind an `Arc`. Mutating
/// operations in one process are serialized; processes sharing a store are
/// not coordinated and may lose updates.
pub struct RateLimiter {
    store: AttemptStore,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    config: LimiterConfig,
    short: Tier,
    long: Tier,
    write_lock: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter using the system clock and no audit sink.
    pub fn new(store: AttemptStore, config: LimiterConfig) -> Self {
        let short = config.short_tier();
        let long = config.long_tier();

        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            audit: Arc::new(NoopAuditSink),
            config,
            short,
            long,
            write_lock: Mutex::new(()),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the audit sink.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The clock decisions are made against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Decide whether `username` may attempt a login right now.
    ///
    /// This never mutates the stored record.
    pub fn can_attempt(&self, username: &UsernameKey) -> AttemptDecision {
        let record = match self.store.try_load(username) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    username = %username,
                    error = %e,
                    failure_mode = ?self.config.failure_mode,
                    "Attempt store unreadable"
                );
                return match self.config.failure_mode {
                    FailureMode::FailOpen => AttemptDecision::allow(),
                    FailureMode::FailClosed => {
                        AttemptDecision::deny(DenyReason::StoreUnavailable, None)
                    }
                };
            }
        };

        let now = self.now();
        match record.active_block(now) {
            Some(until) => {
                trace!(username = %username, unlock_at = %until, "Login attempt blocked");
                AttemptDecision::deny(DenyReason::TemporarilyBlocked, Some(until))
            }
            None => AttemptDecision::allow(),
        }
    }

    /// Record a failed login for `username` and apply the lockout tiers.
    pub fn record_failed_login(&self, username: &UsernameKey) -> FailedLoginOutcome {
        let now = self.now();

        let (outcome, reason_text) = {
            let _guard = self.write_lock.lock();
            let mut record = self.store.load(username);

            record.attempts.push(now);
            record.prune(now - self.config.retention());

            let attempts_15m = record.count_since(now - self.short.window);
            let attempts_1h = record.count_since(now - self.long.window);

            let triggered = self.triggered_tier(attempts_15m, attempts_1h);
            match triggered {
                Some(tier) => record.blocked_until = Some(now + tier.block),
                None => record.clear_expired_block(now),
            }

            self.store.save(username, &record);

            let reason_text = triggered.map(|tier| {
                let count = match tier.reason {
                    BlockReason::Tier15Min => attempts_15m,
                    BlockReason::Tier1Hour => attempts_1h,
                };
                tier.reason.describe(count)
            });

            let outcome = FailedLoginOutcome {
                attempts_15m,
                attempts_1h,
                blocked: triggered.is_some(),
                block_reason: triggered.map(|tier| tier.reason),
                blocked_until: record.blocked_until,
            };
            (outcome, reason_text)
        };

        if let Some(reason) = &reason_text {
            debug!(
                username = %username,
                reason = %reason,
                blocked_until = ?outcome.blocked_until,
                "Login attempts exceeded; user blocked"
            );
        }

        self.audit.append(AuditEvent::at(
            now,
            AuditLevel::Warning,
            "failed_login_recorded",
            json!({
                "username": username.as_str(),
                "now": now.to_rfc3339(),
                "attempts_last_15min": outcome.attempts_15m,
                "attempts_last_1h": outcome.attempts_1h,
                "blockedReason": reason_text,
            }),
        ));

        outcome
    }

    /// Forget every attempt for `username`. Safe to call when nothing is stored.
    pub fn reset_attempts(&self, username: &UsernameKey) {
        let existed = {
            let _guard = self.write_lock.lock();
            self.store.delete(username)
        };

        if existed {
            trace!(username = %username, "Login attempts reset");
            self.audit.append(AuditEvent::at(
                self.now(),
                AuditLevel::Info,
                "reset_attempts",
                json!({ "username": username.as_str() }),
            ));
        }
    }

    /// Every stored record, keyed by normalized username.
    pub fn snapshot(&self) -> BTreeMap<String, AttemptRecord> {
        self.store.load_all_raw()
    }

    /// The current instant at the millisecond precision records are stored with.
    fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
    }

    /// Pick the tier that blocks, if any, for the given window counts.
    fn triggered_tier(&self, attempts_15m: usize, attempts_1h: usize) -> Option<&Tier> {
        let short = Some(&self.short).filter(|tier| tier.is_crossed(attempts_15m));
        let long = Some(&self.long).filter(|tier| tier.is_crossed(attempts_1h));

        match self.config.precedence {
            TierPrecedence::ShortWindowFirst => short.or(long),
            TierPrecedence::Strictest => match (short, long) {
                (Some(s), Some(l)) if l.block > s.block => Some(l),
                (Some(s), _) => Some(s),
                (None, l) => l,
            },
        }
    }
}
