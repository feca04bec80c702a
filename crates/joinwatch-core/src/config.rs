//! Configuration loading and typed config structures for joinwatch.
//!
//! Configuration lives in an optional `joinwatch.yaml`. Every field has a
//! default, so a deployment can also be configured purely from the
//! environment. Environment variables are applied after the YAML is parsed
//! and keep the names the bot has always used (`SERVER`, `TOKEN`,
//! `ANNOUNCE_CHANNEL_ID`), plus a few infrastructure knobs.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `SERVER` | `status.server` |
//! | `STATUS_API_URL` | `status.api_url` |
//! | `TOKEN` | `chat.token` |
//! | `ANNOUNCE_CHANNEL_ID` | `chat.announce_channel_id` |
//! | `POLL_INTERVAL_SECS` | `engine.poll_interval_secs` |
//! | `DATABASE_URL` | `infrastructure.postgres_url` |
//! | `HEALTH_PORT` | `infrastructure.health_port` |
//! | `API_PORT` | `infrastructure.api_port` |

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    Env {
        /// The variable name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A required setting is missing or out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WatchConfig {
    /// Where presence is polled from.
    #[serde(default)]
    pub status: StatusConfig,

    /// Reconciliation loop settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Chat transport settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Database and listener settings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WatchConfig {
    /// Load configuration from a YAML file and apply process environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Env`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults plus process environment overrides, for runs without a
    /// config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if an override is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a numeric override does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SERVER") {
            self.status.server = val;
        }
        if let Some(val) = lookup("STATUS_API_URL") {
            self.status.api_url = val;
        }
        if let Some(val) = lookup("TOKEN") {
            self.chat.token = val;
        }
        if let Some(val) = lookup("ANNOUNCE_CHANNEL_ID") {
            self.chat.announce_channel_id = val;
        }
        if let Some(val) = lookup("DATABASE_URL") {
            self.infrastructure.postgres_url = Some(val);
        }
        if let Some(val) = lookup("POLL_INTERVAL_SECS") {
            self.engine.poll_interval_secs = parse_env("POLL_INTERVAL_SECS", &val)?;
        }
        if let Some(val) = lookup("HEALTH_PORT") {
            self.infrastructure.health_port = parse_env("HEALTH_PORT", &val)?;
        }
        if let Some(val) = lookup("API_PORT") {
            self.infrastructure.api_port = parse_env("API_PORT", &val)?;
        }
        Ok(())
    }

    /// Check that everything needed to start is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status.server.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "status.server is empty (set SERVER)",
            )));
        }
        if self.chat.token.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "chat.token is empty (set TOKEN)",
            )));
        }
        let channel = self.chat.announce_channel_id.trim();
        if channel.is_empty() || !channel.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "chat.announce_channel_id must be a numeric channel id, got {channel:?}"
            )));
        }
        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "engine.poll_interval_secs must be at least 1",
            )));
        }
        if self.infrastructure.health_port == self.infrastructure.api_port {
            return Err(ConfigError::Invalid(format!(
                "health_port and api_port are both {}",
                self.infrastructure.api_port
            )));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name,
        reason: e.to_string(),
    })
}

/// Status source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusConfig {
    /// Base URL of the status API.
    #[serde(default = "default_status_api_url")]
    pub api_url: String,

    /// Address of the game server to watch (host or host:port).
    #[serde(default)]
    pub server: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl StatusConfig {
    /// The per-request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            api_url: default_status_api_url(),
            server: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Reconciliation loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Seconds between reconciliation ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive fetch failures after which each further failure is
    /// logged as a warning instead of at debug level.
    #[serde(default = "default_failure_warn_threshold")]
    pub failure_warn_threshold: u32,
}

impl EngineConfig {
    /// The tick interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            failure_warn_threshold: default_failure_warn_threshold(),
        }
    }
}

/// Chat transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the chat REST API.
    #[serde(default = "default_chat_api_url")]
    pub api_url: String,

    /// Bot token. Normally supplied via `TOKEN` rather than the file.
    #[serde(default)]
    pub token: String,

    /// Channel that join announcements are posted to.
    #[serde(default)]
    pub announce_channel_id: String,

    /// `minijinja` template for a join announcement; `name` is the identity.
    #[serde(default = "default_announce_template")]
    pub announce_template: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ChatConfig {
    /// The per-request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: default_chat_api_url(),
            token: String::new(),
            announce_channel_id: String::new(),
            announce_template: default_announce_template(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Database and listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string. Without one, preferences are kept in
    /// memory only.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Address the HTTP listeners bind to.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Port of the health listener.
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Port of the command API listener.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            bind_host: default_bind_host(),
            health_port: default_health_port(),
            api_port: default_api_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_status_api_url() -> String {
    String::from("https://api.mcsrvstat.us")
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_poll_interval_secs() -> u64 {
    60
}

const fn default_failure_warn_threshold() -> u32 {
    5
}

fn default_chat_api_url() -> String {
    String::from("https://discord.com/api/v10")
}

fn default_announce_template() -> String {
    String::from("🎮 **{{ name }}** just joined the minecraft server!")
}

fn default_bind_host() -> String {
    String::from("0.0.0.0")
}

const fn default_health_port() -> u16 {
    8080
}

const fn default_api_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    String::from("info")
}
