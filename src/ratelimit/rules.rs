//! Lockout tiers and limiter configuration.
//!
//! Two tiers are evaluated on every failed login: a short window (15 minutes
//! by default) and a long window (1 hour by default). Crossing a tier's
//! threshold blocks the user for that tier's block duration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{LoginGuardError, Result};

/// Upper bound for any configured window or block duration (ten years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Which tier caused a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockReason {
    /// The short-window threshold was crossed
    #[serde(rename = "TIER_15MIN")]
    Tier15Min,
    /// The long-window threshold was crossed
    #[serde(rename = "TIER_1HOUR")]
    Tier1Hour,
}

impl BlockReason {
    /// Human-readable reason used in audit metadata,
    /// e.g. `blocked_15min_after_5_attempts`.
    pub fn describe(&self, count: usize) -> String {
        match self {
            BlockReason::Tier15Min => format!("blocked_15min_after_{}_attempts", count),
            BlockReason::Tier1Hour => format!("blocked_1h_after_{}_attempts", count),
        }
    }
}

/// A single lockout tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// Attempts within `window` that trigger a block
    pub max_attempts: usize,
    /// Trailing window the attempts are counted in
    pub window: Duration,
    /// How long the block lasts once triggered
    pub block: Duration,
    /// Reason reported when this tier triggers
    pub reason: BlockReason,
}

impl Tier {
    /// Whether `count` attempts within the window cross this tier's threshold.
    pub fn is_crossed(&self, count: usize) -> bool {
        count >= self.max_attempts
    }
}

/// Behavior of `can_attempt` when the attempt store cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Allow the attempt
    #[default]
    FailOpen,
    /// Deny the attempt
    FailClosed,
}

/// Which tier wins when both thresholds are crossed by the same attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierPrecedence {
    /// The short-window tier is checked first and wins
    #[default]
    ShortWindowFirst,
    /// The tier with the later block expiry wins
    Strictest,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Attempts within the short window before blocking
    #[serde(default = "default_max_attempts_15m")]
    pub max_attempts_15m: u32,

    /// Short window length in seconds
    #[serde(default = "default_window_15m_secs")]
    pub window_15m_secs: u64,

    /// Block duration in seconds once the short tier triggers
    #[serde(default = "default_block_15m_secs")]
    pub block_15m_secs: u64,

    /// Attempts within the long window before blocking
    #[serde(default = "default_max_attempts_1h")]
    pub max_attempts_1h: u32,

    /// Long window length in seconds
    #[serde(default = "default_window_1h_secs")]
    pub window_1h_secs: u64,

    /// Block duration in seconds once the long tier triggers
    #[serde(default = "default_block_1h_secs")]
    pub block_1h_secs: u64,

    /// Storage fault policy for `can_attempt`
    #[serde(default)]
    pub failure_mode: FailureMode,

    /// Tier precedence when both thresholds are crossed
    #[serde(default)]
    pub precedence: TierPrecedence,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts_15m: default_max_attempts_15m(),
            window_15m_secs: default_window_15m_secs(),
            block_15m_secs: default_block_15m_secs(),
            max_attempts_1h: default_max_attempts_1h(),
            window_1h_secs: default_window_1h_secs(),
            block_1h_secs: default_block_1h_secs(),
            failure_mode: FailureMode::default(),
            precedence: TierPrecedence::default(),
        }
    }
}

fn default_max_attempts_15m() -> u32 {
    5
}

fn default_window_15m_secs() -> u64 {
    15 * 60
}

fn default_block_15m_secs() -> u64 {
    15 * 60
}

fn default_max_attempts_1h() -> u32 {
    10
}

fn default_window_1h_secs() -> u64 {
    60 * 60
}

fn default_block_1h_secs() -> u64 {
    60 * 60
}

impl LimiterConfig {
    /// The short-window tier.
    pub fn short_tier(&self) -> Tier {
        Tier {
            max_attempts: self.max_attempts_15m as usize,
            window: secs(self.window_15m_secs),
            block: secs(self.block_15m_secs),
            reason: BlockReason::Tier15Min,
        }
    }

    /// The long-window tier.
    pub fn long_tier(&self) -> Tier {
        Tier {
            max_attempts: self.max_attempts_1h as usize,
            window: secs(self.window_1h_secs),
            block: secs(self.block_1h_secs),
            reason: BlockReason::Tier1Hour,
        }
    }

    /// How far back attempts are retained: the longer of the two windows.
    pub fn retention(&self) -> Duration {
        secs(self.window_15m_secs.max(self.window_1h_secs))
    }

    /// Reject thresholds or durations that would make the limiter meaningless.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.max_attempts_15m == 0 {
            problems.push("max_attempts_15m must be greater than 0".to_string());
        }
        if self.max_attempts_1h == 0 {
            problems.push("max_attempts_1h must be greater than 0".to_string());
        }

        for (name, value) in [
            ("window_15m_secs", self.window_15m_secs),
            ("block_15m_secs", self.block_15m_secs),
            ("window_1h_secs", self.window_1h_secs),
            ("block_1h_secs", self.block_1h_secs),
        ] {
            if value == 0 {
                problems.push(format!("{} must be greater than 0", name));
            } else if value > MAX_DURATION_SECS {
                problems.push(format!("{} must not exceed {} seconds", name, MAX_DURATION_SECS));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LoginGuardError::Config(problems.join("; ")))
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_DURATION_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let config = LimiterConfig::default();

        let short = config.short_tier();
        assert_eq!(short.max_attempts, 5);
        assert_eq!(short.window, Duration::minutes(15));
        assert_eq!(short.block, Duration::minutes(15));
        assert_eq!(short.reason, BlockReason::Tier15Min);

        let long = config.long_tier();
        assert_eq!(long.max_attempts, 10);
        assert_eq!(long.window, Duration::hours(1));
        assert_eq!(long.block, Duration::hours(1));
        assert_eq!(long.reason, BlockReason::Tier1Hour);

        assert_eq!(config.retention(), Duration::hours(1));
    }

    #[test]
    fn test_tier_threshold() {
        let tier = LimiterConfig::default().short_tier();
        assert!(!tier.is_crossed(4));
        assert!(tier.is_crossed(5));
        assert!(tier.is_crossed(6));
    }

    #[test]
    fn test_block_reason_description() {
        assert_eq!(
            BlockReason::Tier15Min.describe(5),
            "blocked_15min_after_5_attempts"
        );
        assert_eq!(
            BlockReason::Tier1Hour.describe(10),
            "blocked_1h_after_10_attempts"
        );
    }

    #[test]
    fn test_block_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&BlockReason::Tier15Min).unwrap(),
            "\"TIER_15MIN\""
        );
        assert_eq!(
            serde_json::to_string(&BlockReason::Tier1Hour).unwrap(),
            "\"TIER_1HOUR\""
        );
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
max_attempts_15m: 3
failure_mode: fail_closed
precedence: strictest
"#;
        let config: LimiterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_attempts_15m, 3);
        assert_eq!(config.max_attempts_1h, 10);
        assert_eq!(config.failure_mode, FailureMode::FailClosed);
        assert_eq!(config.precedence, TierPrecedence::Strictest);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(LimiterConfig::default().validate().is_ok());

        let config = LimiterConfig {
            max_attempts_15m: 0,
            block_1h_secs: 0,
            ..LimiterConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_attempts_15m"));
        assert!(err.contains("block_1h_secs"));
    }

    #[test]
    fn test_validate_rejects_huge_durations() {
        let config = LimiterConfig {
            window_1h_secs: u64::MAX,
            ..LimiterConfig::default()
        };
        assert!(config.validate().is_err());
        // Still usable without panicking
        assert!(config.retention() > Duration::hours(1));
    }
}
