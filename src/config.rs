//! Configuration loader and validator for the relay bot.
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
}

/// Process-level settings and relay timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Sleep between polls while the queue is empty or paused.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Cooldown after an unexpected worker error.
    #[serde(default = "default_error_cooldown_seconds")]
    pub error_cooldown_seconds: u64,
    /// How long a staged caption stays valid.
    #[serde(default = "default_caption_window_ms")]
    pub caption_window_ms: u64,
    /// Quiet period before a batch acknowledgement is sent.
    #[serde(default = "default_batch_quiet_ms")]
    pub batch_quiet_ms: u64,
    /// Zone used for "today" counters and dashboard timestamps.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    /// Channel or group every relayed item is copied into.
    pub target_chat_id: i64,
    /// Trusted senders; also the admins allowed to run commands.
    pub allowed_users: Vec<i64>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_error_cooldown_seconds() -> u64 {
    5
}

fn default_caption_window_ms() -> u64 {
    5000
}

fn default_batch_quiet_ms() -> u64 {
    3000
}

fn default_utc_offset_minutes() -> i32 {
    360
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/relaybot.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }
}

impl App {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_seconds)
    }

    pub fn caption_window(&self) -> Duration {
        Duration::from_millis(self.caption_window_ms)
    }

    pub fn batch_quiet(&self) -> Duration {
        Duration::from_millis(self.batch_quiet_ms)
    }

    pub fn zone(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::Invalid("app.utc_offset_minutes is out of range"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.error_cooldown_seconds == 0 {
        return Err(ConfigError::Invalid("app.error_cooldown_seconds must be > 0"));
    }
    if cfg.app.caption_window_ms == 0 {
        return Err(ConfigError::Invalid("app.caption_window_ms must be > 0"));
    }
    if cfg.app.batch_quiet_ms == 0 {
        return Err(ConfigError::Invalid("app.batch_quiet_ms must be > 0"));
    }
    if cfg.app.utc_offset_minutes.abs() > 14 * 60 {
        return Err(ConfigError::Invalid(
            "app.utc_offset_minutes must be within +/-840",
        ));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.target_chat_id == 0 {
        return Err(ConfigError::Invalid("telegram.target_chat_id must be set"));
    }
    if cfg.telegram.allowed_users.is_empty() {
        return Err(ConfigError::Invalid(
            "telegram.allowed_users must list at least one sender",
        ));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 2000
  error_cooldown_seconds: 5
  caption_window_ms: 5000
  batch_quiet_ms: 3000
  utc_offset_minutes: 360

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  target_chat_id: -1001234567890
  allowed_users:
    - 123456789
    - 987654321
"#
}
