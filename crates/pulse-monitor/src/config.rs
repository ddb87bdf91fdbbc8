//! Application configuration.

use crate::error::{AppError, AppResult};
use pulse_fallback::PollerConfig;
use pulse_feed::SubscriptionClass;
use pulse_flash::GeneratorConfig;
use pulse_ws::ChannelConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// One tracked game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Subscription key.
    pub key: String,
    /// Optional class profile name (see `[classes.<name>]`).
    #[serde(default)]
    pub class: Option<String>,
}

/// Push channel settings, applied to every subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Handshake timeout (ms). Default: 10,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Heartbeat ping interval (ms). Default: 30,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Automatic retry budget. Default: 3.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for reconnection backoff (ms). Default: 1,000.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Backoff cap (ms). Default: 30,000.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Close code the server uses for rejected credentials. Default: 4401.
    #[serde(default = "default_auth_rejected_code")]
    pub auth_rejected_code: u16,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_auth_rejected_code() -> u16 {
    4401
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            auth_rejected_code: default_auth_rejected_code(),
        }
    }
}

impl From<ChannelSettings> for ChannelConfig {
    fn from(cfg: ChannelSettings) -> Self {
        Self {
            url: String::new(), // Set per key by the builder
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(cfg.heartbeat_interval_ms),
            max_retry_attempts: cfg.max_retry_attempts,
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
            auth_rejected_code: cfg.auth_rejected_code,
        }
    }
}

/// Fallback poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// Poll interval while the channel is down (seconds). Default: 30.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request timeout (ms). Default: 10,000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl From<FallbackSettings> for PollerConfig {
    fn from(cfg: FallbackSettings) -> Self {
        Self {
            url: String::new(), // Set per key by the builder
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        }
    }
}

/// Flash pattern generator settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlashSettings {
    /// Duration of each flash event (ms). Default: 500.
    #[serde(default = "default_event_duration_ms")]
    pub event_duration_ms: u64,
}

fn default_event_duration_ms() -> u64 {
    500
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self {
            event_duration_ms: default_event_duration_ms(),
        }
    }
}

impl From<FlashSettings> for GeneratorConfig {
    fn from(cfg: FlashSettings) -> Self {
        Self {
            event_duration_ms: cfg.event_duration_ms,
        }
    }
}

/// Named class profile overriding retry budget and poll cadence per game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassSettings {
    /// Automatic retry budget for this class.
    pub max_retry_attempts: u32,
    /// Poll interval for this class (seconds).
    pub poll_interval_secs: u64,
}

impl From<ClassSettings> for SubscriptionClass {
    fn from(cfg: ClassSettings) -> Self {
        Self {
            max_retry_attempts: cfg.max_retry_attempts,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Push channel endpoint template; `{key}` is replaced per game.
    pub channel_endpoint: String,
    /// Poll endpoint template; `{key}` is replaced per game.
    pub poll_endpoint: String,
    /// Games to track at startup.
    #[serde(default)]
    pub games: Vec<GameConfig>,
    /// Push channel settings.
    #[serde(default)]
    pub channel: ChannelSettings,
    /// Fallback poller settings.
    #[serde(default)]
    pub fallback: FallbackSettings,
    /// Flash pattern settings.
    #[serde(default)]
    pub flash: FlashSettings,
    /// Class profiles referenced by `games[].class`.
    #[serde(default)]
    pub classes: HashMap<String, ClassSettings>,
    /// Status report interval (seconds). Default: 30.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn default_status_interval_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channel_endpoint: "wss://feed.example.com/momentum/{key}".to_string(),
            poll_endpoint: "https://feed.example.com/momentum/{key}".to_string(),
            games: Vec::new(),
            channel: ChannelSettings::default(),
            fallback: FallbackSettings::default(),
            flash: FlashSettings::default(),
            classes: HashMap::new(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Resolve and load configuration: CLI path > `PULSE_CONFIG` env var >
    /// default file. An explicitly named file must exist and parse; only the
    /// default path falls back to built-in defaults when missing.
    pub fn load(cli_path: Option<&str>) -> AppResult<Self> {
        let explicit = cli_path
            .map(str::to_string)
            .or_else(|| std::env::var("PULSE_CONFIG").ok());

        if let Some(path) = explicit {
            tracing::info!(config_path = %path, "Loading configuration");
            return Self::from_file(&path);
        }

        let default_path = "config/default.toml";
        if Path::new(default_path).exists() {
            tracing::info!(config_path = %default_path, "Loading configuration");
            Self::from_file(default_path)
        } else {
            tracing::warn!(path = %default_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}
