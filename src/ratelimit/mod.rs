//! Login-attempt rate limiting and lockout state.

mod key;
mod limiter;
mod record;
mod rules;

pub use key::{UsernameKey, UNKNOWN_USERNAME};
pub use limiter::{AttemptDecision, DenyReason, FailedLoginOutcome, RateLimiter};
pub use record::AttemptRecord;
pub use rules::{BlockReason, FailureMode, LimiterConfig, Tier, TierPrecedence};
