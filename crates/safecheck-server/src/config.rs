//! Server configuration.
//!
//! Layered: built-in defaults, then `config.toml` in the data directory, then
//! environment variables.

use safecheck_core::notify::TwilioConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_ESCALATION_POLL_SECS: u64 = 60;
pub const DEFAULT_OVERDUE_SWEEP_SECS: u64 = 30;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory (`SAFECHECK_DIR`, default `~/.safecheck`)
    pub data_dir: PathBuf,
    /// Path to configuration file
    pub config_path: PathBuf,
    /// HTTP listen address
    pub bind_addr: String,
    /// Database path
    pub database_path: PathBuf,
    /// Keep everything in memory instead of SQLite
    pub in_memory: bool,
    pub escalation_poll_interval: Duration,
    pub overdue_sweep_interval: Duration,
    /// Twilio credentials; console SMS when unset
    pub twilio: Option<TwilioConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind_addr: Option<String>,
    database_path: Option<PathBuf>,
    in_memory: Option<bool>,
    escalation_poll_secs: Option<u64>,
    overdue_sweep_secs: Option<u64>,
    #[serde(default)]
    twilio: TwilioSection,
}

#[derive(Debug, Default, Deserialize)]
struct TwilioSection {
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Standard directory structure:
    /// ```text
    /// ~/.safecheck/
    /// ├── config.toml           # Optional overrides
    /// └── safecheck.db          # Database
    /// ```
    pub fn load() -> anyhow::Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        // Use SAFECHECK_DIR env var if set, otherwise ~/.safecheck
        let data_dir = std::env::var("SAFECHECK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".safecheck"));

        Self::load_from(&data_dir, |key| std::env::var(key).ok())
    }

    /// Load using `data_dir` and an environment lookup.
    pub fn load_from(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let config_path = data_dir.join("config.toml");
        let file: FileConfig = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("invalid {}: {}", config_path.display(), e))?
        } else {
            FileConfig::default()
        };

        let bind_addr = env("SAFECHECK_BIND_ADDR")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let database_path = env("SAFECHECK_DATABASE_PATH")
            .map(PathBuf::from)
            .or(file.database_path)
            .unwrap_or_else(|| data_dir.join("safecheck.db"));

        let in_memory = match env("SAFECHECK_IN_MEMORY") {
            Some(v) => parse_bool("SAFECHECK_IN_MEMORY", &v)?,
            None => file.in_memory.unwrap_or(false),
        };

        let escalation_poll_secs = match env("SAFECHECK_ESCALATION_POLL_SECS") {
            Some(v) => parse_secs("SAFECHECK_ESCALATION_POLL_SECS", &v)?,
            None => file
                .escalation_poll_secs
                .unwrap_or(DEFAULT_ESCALATION_POLL_SECS),
        };
        let overdue_sweep_secs = match env("SAFECHECK_OVERDUE_SWEEP_SECS") {
            Some(v) => parse_secs("SAFECHECK_OVERDUE_SWEEP_SECS", &v)?,
            None => file.overdue_sweep_secs.unwrap_or(DEFAULT_OVERDUE_SWEEP_SECS),
        };
        if escalation_poll_secs == 0 || overdue_sweep_secs == 0 {
            anyhow::bail!("poll intervals must be at least one second");
        }

        let twilio = twilio_config(
            env("TWILIO_ACCOUNT_SID").or(file.twilio.account_sid),
            env("TWILIO_AUTH_TOKEN").or(file.twilio.auth_token),
            env("TWILIO_FROM_NUMBER").or(file.twilio.from_number),
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config_path,
            bind_addr,
            database_path,
            in_memory,
            escalation_poll_interval: Duration::from_secs(escalation_poll_secs),
            overdue_sweep_interval: Duration::from_secs(overdue_sweep_secs),
            twilio,
        })
    }
}

fn twilio_config(
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
) -> Option<TwilioConfig> {
    match (account_sid, auth_token, from_number) {
        (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
            account_sid,
            auth_token,
            from_number,
        }),
        (None, None, None) => None,
        _ => {
            warn!("Incomplete Twilio credentials, falling back to console SMS");
            None
        }
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{} must be a boolean, got {:?}", key, other),
    }
}

fn parse_secs(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds, got {:?}", key, value))
}
