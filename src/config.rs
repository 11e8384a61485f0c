//! Configuration management for Loginguard.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{DEFAULT_AUDIT_KEY, DEFAULT_MAX_ENTRIES};
use crate::auth::DEFAULT_SESSION_KEY;
use crate::error::{LoginGuardError, Result};
use crate::ratelimit::LimiterConfig;
use crate::store::DEFAULT_ATTEMPTS_KEY;

/// Prefix for environment overrides, e.g. `LOGINGUARD__LIMITER__MAX_ATTEMPTS_15M=3`.
pub const ENV_PREFIX: &str = "LOGINGUARD";

/// Main configuration for Loginguard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginGuardConfig {
    /// Lockout thresholds and policies
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Where state is kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Audit log settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Accepted credentials
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the file-backed store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Key holding the attempt map
    #[serde(default = "default_attempts_key")]
    pub attempts_key: String,

    /// Key holding the current session
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            attempts_key: default_attempts_key(),
            session_key: default_session_key(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".loginguard")
}

fn default_attempts_key() -> String {
    DEFAULT_ATTEMPTS_KEY.to_string()
}

fn default_session_key() -> String {
    DEFAULT_SESSION_KEY.to_string()
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Persist audit events; when false they are only logged
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,

    /// Key holding the audit array
    #[serde(default = "default_audit_key")]
    pub key: String,

    /// Maximum number of retained events
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            key: default_audit_key(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_key() -> String {
    DEFAULT_AUDIT_KEY.to_string()
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

/// Credentials accepted by the built-in verifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Per-user passwords
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Password accepted for users not listed in `users`
    #[serde(default)]
    pub shared_password: Option<String>,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl LoginGuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LoginGuardError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load defaults, then an optional YAML file, then `LOGINGUARD__*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<LoginGuardConfig>())
            .map_err(|e| LoginGuardError::Config(format!("Failed to load configuration: {}", e)))
    }

    /// Check the configuration for values the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()?;

        if self.audit.max_entries == 0 {
            return Err(LoginGuardError::Config(
                "audit.max_entries must be greater than 0".to_string(),
            ));
        }
        for (name, key) in [
            ("storage.attempts_key", &self.storage.attempts_key),
            ("storage.session_key", &self.storage.session_key),
            ("audit.key", &self.audit.key),
        ] {
            if key.trim().is_empty() {
                return Err(LoginGuardError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}
