use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use loginguard::audit::{AuditFilter, AuditLevel, AuditSink, KvAuditLog, TracingAuditSink};
use loginguard::auth::{KvSessionManager, LoginService, StaticCredentials};
use loginguard::config::{LoggingConfig, LoginGuardConfig};
use loginguard::ratelimit::{RateLimiter, UsernameKey};
use loginguard::store::{AttemptStore, FileKvStore, KvStore};

/// loginguard - login attempt throttling
#[derive(Parser, Debug)]
#[command(name = "loginguard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding throttle state (overrides the configuration)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a user may attempt a login
    Check {
        /// Username (normalized before use)
        username: String,
    },

    /// Record a failed login for a user
    Fail { username: String },

    /// Forget all failed logins for a user
    Reset { username: String },

    /// Run the full login flow
    Login {
        username: String,

        /// Password to verify
        #[arg(short, long)]
        password: String,
    },

    /// End the current session
    Logout,

    /// Show the user with an active session
    Whoami,

    /// Dump every stored attempt record
    Inspect,

    /// Show or clear the audit log
    Audit {
        /// Only events at this level (info, warning, error)
        #[arg(long, value_parser = parse_level)]
        level: Option<AuditLevel>,

        /// Only events whose message contains this text
        #[arg(long)]
        contains: Option<String>,

        /// Delete every audit event instead of listing them
        #[arg(long)]
        clear: bool,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn parse_level(raw: &str) -> Result<AuditLevel, String> {
    match raw.to_ascii_lowercase().as_str() {
        "info" => Ok(AuditLevel::Info),
        "warning" | "warn" => Ok(AuditLevel::Warning),
        "error" => Ok(AuditLevel::Error),
        other => Err(format!("unknown audit level: {}", other)),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = LoginGuardConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    config.validate()?;

    init_tracing(&config.logging);
    debug!(data_dir = %config.storage.data_dir.display(), "Configuration loaded");

    let kv: Arc<dyn KvStore> = Arc::new(
        FileKvStore::open(&config.storage.data_dir).with_context(|| {
            format!(
                "Failed to open data directory {}",
                config.storage.data_dir.display()
            )
        })?,
    );

    let audit_log = Arc::new(
        KvAuditLog::new(kv.clone())
            .with_key(config.audit.key.clone())
            .with_max_entries(config.audit.max_entries),
    );
    let audit: Arc<dyn AuditSink> = if config.audit.enabled {
        audit_log.clone()
    } else {
        Arc::new(TracingAuditSink)
    };

    let limiter = Arc::new(
        RateLimiter::new(
            AttemptStore::with_key(kv.clone(), config.storage.attempts_key.clone()),
            config.limiter.clone(),
        )
        .with_audit_sink(audit.clone()),
    );
    let sessions = Arc::new(
        KvSessionManager::new(kv.clone())
            .with_key(config.storage.session_key.clone())
            .with_audit_sink(audit.clone()),
    );
    let service = LoginService::new(
        limiter.clone(),
        Arc::new(StaticCredentials::from_config(&config.credentials)),
        sessions,
        audit,
    );

    match cli.command {
        Commands::Check { username } => {
            let key = UsernameKey::new(&username);
            print_json(&limiter.can_attempt(&key))?;
        }
        Commands::Fail { username } => {
            let key = UsernameKey::new(&username);
            print_json(&limiter.record_failed_login(&key))?;
        }
        Commands::Reset { username } => {
            let key = UsernameKey::new(&username);
            limiter.reset_attempts(&key);
            print_json(&json!({ "ok": true, "username": key.as_str() }))?;
        }
        Commands::Login { username, password } => {
            let outcome = service.login(&username, &password);
            info!(success = outcome.is_success(), "Login flow finished");
            print_json(&outcome)?;
        }
        Commands::Logout => {
            let user = service.logout();
            print_json(&json!({ "ok": true, "username": user }))?;
        }
        Commands::Whoami => {
            print_json(&json!({ "username": service.current_user() }))?;
        }
        Commands::Inspect => {
            print_json(&limiter.snapshot())?;
        }
        Commands::Audit {
            level,
            contains,
            clear,
        } => {
            if clear {
                print_json(&json!({ "ok": audit_log.clear() }))?;
            } else {
                print_json(&audit_log.search(&AuditFilter { level, contains }))?;
            }
        }
        Commands::ShowConfig => {
            print_json(&config)?;
        }
    }

    Ok(())
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", rendered);
    Ok(())
}
