//! End-to-end lockout scenarios against a file-backed store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use loginguard::audit::{AuditLevel, KvAuditLog};
use loginguard::auth::{KvSessionManager, LoginOutcome, LoginService, StaticCredentials};
use loginguard::clock::MockClock;
use loginguard::ratelimit::{BlockReason, LimiterConfig, RateLimiter, UsernameKey};
use loginguard::store::{AttemptStore, FileKvStore, KvStore, DEFAULT_ATTEMPTS_KEY};
use serde_json::Value;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    kv: Arc<FileKvStore>,
    clock: MockClock,
    audit: Arc<KvAuditLog>,
    limiter: Arc<RateLimiter>,
    service: LoginService,
    start: DateTime<Utc>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(FileKvStore::open(dir.path()).unwrap());
    let start = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();
    let clock = MockClock::new(start);
    let audit = Arc::new(KvAuditLog::new(kv.clone()));

    let limiter = Arc::new(
        RateLimiter::new(AttemptStore::new(kv.clone()), LimiterConfig::default())
            .with_clock(Arc::new(clock.clone()))
            .with_audit_sink(audit.clone()),
    );
    let sessions = KvSessionManager::new(kv.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_audit_sink(audit.clone());
    let service = LoginService::new(
        limiter.clone(),
        Arc::new(StaticCredentials::new().with_shared_password("1234")),
        Arc::new(sessions),
        audit.clone(),
    );

    Harness {
        _dir: dir,
        kv,
        clock,
        audit,
        limiter,
        service,
        start,
    }
}

fn persisted(kv: &FileKvStore) -> Value {
    kv.get(DEFAULT_ATTEMPTS_KEY)
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
        .unwrap_or(Value::Null)
}

#[test]
fn test_alice_blocked_on_fifth_failure_within_five_minutes() {
    let h = harness();
    let alice = UsernameKey::new("alice");

    let mut last = None;
    for minute in 0..5 {
        h.clock.set(h.start + Duration::minutes(minute));
        last = Some(h.limiter.record_failed_login(&alice));
    }

    let t4 = h.start + Duration::minutes(4);
    let outcome = last.unwrap();
    assert!(outcome.blocked);
    assert_eq!(outcome.block_reason, Some(BlockReason::Tier15Min));
    assert_eq!(outcome.blocked_until, Some(t4 + Duration::minutes(15)));

    h.clock.set(h.start + Duration::minutes(5));
    let decision = h.limiter.can_attempt(&alice);
    assert!(!decision.allowed);
    assert_eq!(decision.unlock_at, Some(t4 + Duration::minutes(15)));

    let record = &persisted(&h.kv)["alice"];
    assert_eq!(record["attempts"].as_array().unwrap().len(), 5);
    assert_eq!(
        record["blockedUntil"].as_i64(),
        Some((t4 + Duration::minutes(15)).timestamp_millis())
    );
}

#[test]
fn test_successful_login_removes_persisted_record() {
    let h = harness();
    for _ in 0..3 {
        assert!(!h.service.login("Alice", "nope").is_success());
    }
    assert!(persisted(&h.kv).get("alice").is_some());

    assert!(h.service.login("alice", "1234").is_success());
    assert!(h.limiter.can_attempt(&UsernameKey::new("alice")).allowed);
    assert!(persisted(&h.kv).get("alice").is_none());
    assert_eq!(h.service.current_user().as_deref(), Some("alice"));
}

#[test]
fn test_blocked_login_reports_unlock_time() {
    let h = harness();
    for _ in 0..5 {
        h.service.login("bob", "nope");
    }

    h.clock.advance(Duration::minutes(3));
    match h.service.login("bob", "1234") {
        LoginOutcome::Blocked { username, unlock_at } => {
            assert_eq!(username, "bob");
            assert_eq!(unlock_at, Some(h.start + Duration::minutes(15)));
        }
        other => panic!("expected a blocked outcome, got {:?}", other),
    }

    let warnings = h
        .audit
        .all()
        .into_iter()
        .filter(|e| e.level == AuditLevel::Warning)
        .count();
    // 5 failed_login_recorded + 5 user_login_failed + 1 login_blocked_attempt
    assert_eq!(warnings, 11);
}

#[test]
fn test_state_survives_a_new_limiter_on_the_same_directory() {
    let h = harness();
    for _ in 0..5 {
        h.limiter.record_failed_login(&UsernameKey::new("carol"));
    }

    let reopened = RateLimiter::new(
        AttemptStore::new(Arc::new(FileKvStore::open(h.kv.data_dir()).unwrap())),
        LimiterConfig::default(),
    )
    .with_clock(Arc::new(h.clock.clone()));

    assert!(!reopened.can_attempt(&UsernameKey::new("CAROL")).allowed);
    assert_eq!(reopened.snapshot().len(), 1);
}

#[test]
fn test_six_attempts_twenty_minutes_apart_never_block() {
    let h = harness();
    let dave = UsernameKey::new("dave");

    for i in 0..6 {
        h.clock.set(h.start + Duration::minutes(20 * i));
        assert!(h.limiter.can_attempt(&dave).allowed);
        assert!(!h.limiter.record_failed_login(&dave).blocked);
    }
}

#[test]
fn test_sub_millisecond_start_matches_persisted_block() {
    let h = harness();
    let start = h.start + Duration::nanoseconds(987_654_321);
    h.clock.set(start);

    let dave = UsernameKey::new("dave");
    let mut last = None;
    for _ in 0..5 {
        last = Some(h.limiter.record_failed_login(&dave));
    }
    let until = last.unwrap().blocked_until.unwrap();

    let stored = persisted(&h.kv)["dave"]["blockedUntil"].as_i64();
    assert_eq!(stored, Some(until.timestamp_millis()));

    h.clock.set(until - Duration::microseconds(1));
    let decision = h.limiter.can_attempt(&dave);
    assert!(!decision.allowed);
    assert_eq!(decision.unlock_at, Some(until));
}
