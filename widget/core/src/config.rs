//! Widget Configuration
//!
//! Boot-time settings for the widget, loaded from an optional TOML file at
//! `~/.config/chat-widget/widget.toml` and overridden by `WIDGET_*`
//! environment variables.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The socket URL has no default. A configuration without one fails to
//! load with [`ConfigError::MissingSocketUrl`].
//!
//! # Example Configuration
//!
//! ```toml
//! socket_url = "wss://chat.example.com/ws"
//! history_url = "https://chat.example.com/api/history"
//! allowed_users = ["alice", "bob"]
//!
//! [session]
//! watchdog_ms = 15000
//! stream_tick_ms = 6
//! history_page_size = 8
//! connect_timeout_ms = 5000
//! reconnect = "queue"
//! welcome_message = "Hi! Ask me anything."
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::DEFAULT_PAGE_SIZE;
use crate::messages::DEFAULT_WELCOME_TEXT;
use crate::streaming::DEFAULT_STREAM_TICK;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No socket URL in any source
    #[error("No socket URL configured (set socket_url or WIDGET_SOCKET_URL)")]
    MissingSocketUrl,

    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Session Settings
// =============================================================================

/// What to do with a message typed while no connection is live
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicy {
    /// Hold the text and send it right after the next auth frame
    #[default]
    Queue,
    /// Drop the text and ask the user to send it again
    Resend,
}

impl fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Resend => write!(f, "resend"),
        }
    }
}

impl FromStr for ReconnectPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "resend" => Ok(Self::Resend),
            other => Err(ConfigError::ValidationError(format!(
                "unknown reconnect policy \"{other}\" (expected queue or resend)"
            ))),
        }
    }
}

/// Timing and behavior of one widget session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long a processing status may stand before escalating
    pub watchdog: Duration,
    /// Delay between revealed characters of a streamed answer
    pub stream_tick: Duration,
    /// History records requested per page
    pub history_page_size: usize,
    /// Upper bound on establishing a connection
    pub connect_timeout: Duration,
    /// Handling of sends without a live connection
    pub reconnect: ReconnectPolicy,
    /// First message of a fresh log
    pub welcome_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(15),
            stream_tick: DEFAULT_STREAM_TICK,
            history_page_size: DEFAULT_PAGE_SIZE,
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::Queue,
            welcome_message: DEFAULT_WELCOME_TEXT.to_string(),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Watchdog duration in milliseconds
    pub watchdog_ms: Option<u64>,

    /// Stream tick in milliseconds
    pub stream_tick_ms: Option<u64>,

    /// History page size
    pub history_page_size: Option<usize>,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Reconnect policy
    pub reconnect: Option<ReconnectPolicy>,

    /// Welcome message
    pub welcome_message: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetToml {
    /// Chat connection URL
    pub socket_url: Option<String>,

    /// History endpoint URL
    pub history_url: Option<String>,

    /// User ids allowed to open the widget
    pub allowed_users: Option<Vec<String>>,

    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Validated widget configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Chat connection URL (`ws://` or `wss://`)
    pub socket_url: String,

    /// History endpoint (`http://` or `https://`); `None` disables history
    pub history_url: Option<String>,

    /// Allowed user ids; empty allows everyone
    pub allowed_users: Vec<String>,

    /// Session settings
    pub session: SessionSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
}

impl WidgetConfig {
    /// Configuration with defaults for everything but the socket URL
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
            history_url: None,
            allowed_users: Vec::new(),
            session: SessionSettings::default(),
            config_file_path: None,
        }
    }

    /// Set the history endpoint
    #[must_use]
    pub fn with_history_url(mut self, url: impl Into<String>) -> Self {
        self.history_url = Some(url.into());
        self
    }

    /// Restrict the widget to the given user ids
    #[must_use]
    pub fn with_allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the session settings
    #[must_use]
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Whether `user_id` may open the widget
    #[must_use]
    pub fn is_user_allowed(&self, user_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user_id)
    }

    /// Check values for consistency
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a bad URL scheme, a zero
    /// duration, or a zero page size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url(&self.socket_url, &["ws", "wss"], "socket_url")?;
        if let Some(ref url) = self.history_url {
            check_url(url, &["http", "https"], "history_url")?;
        }

        let session = &self.session;
        for (name, value) in [
            ("watchdog_ms", session.watchdog),
            ("stream_tick_ms", session.stream_tick),
            ("connect_timeout_ms", session.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if session.history_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "history_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_url(raw: &str, schemes: &[&str], field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::ValidationError(format!("{field} \"{raw}\" is not a URL: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::ValidationError(format!(
            "{field} must use one of {schemes:?}, got \"{}\"",
            url.scheme()
        )));
    }
    Ok(())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-widget/widget.toml` or
/// `~/.config/chat-widget/widget.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-widget").join("widget.toml"))
}

/// Load configuration from the default file and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// if no socket URL is configured, or if validation fails.
pub fn load_config() -> Result<WidgetConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// A missing file is not an error (defaults are used).
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<WidgetConfig, ConfigError> {
    load_config_with(path, &ConfigOverrides::default(), |key| std::env::var(key).ok())
}

/// Load configuration with explicit overrides and environment lookup
///
/// `env` is consulted for each `WIDGET_*` key.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with<F>(
    path: Option<PathBuf>,
    overrides: &ConfigOverrides,
    env: F,
) -> Result<WidgetConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut toml_config = WidgetToml::default();
    let mut loaded_from = None;

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            toml_config = toml::from_str(&toml_content)?;
            loaded_from = Some(config_path.clone());

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut toml_config, &env)?;
    overrides.apply(&mut toml_config);

    let socket_url = toml_config
        .socket_url
        .filter(|url| !url.trim().is_empty())
        .ok_or(ConfigError::MissingSocketUrl)?;

    let mut config = WidgetConfig::new(socket_url);
    config.history_url = toml_config.history_url.filter(|url| !url.trim().is_empty());
    config.allowed_users = toml_config.allowed_users.unwrap_or_default();
    config.config_file_path = loaded_from;
    apply_session_toml(&mut config.session, &toml_config.session);

    config.validate()?;
    Ok(config)
}

fn apply_session_toml(session: &mut SessionSettings, toml: &SessionToml) {
    if let Some(ms) = toml.watchdog_ms {
        session.watchdog = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.stream_tick_ms {
        session.stream_tick = Duration::from_millis(ms);
    }
    if let Some(size) = toml.history_page_size {
        session.history_page_size = size;
    }
    if let Some(ms) = toml.connect_timeout_ms {
        session.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(policy) = toml.reconnect {
        session.reconnect = policy;
    }
    if let Some(ref welcome) = toml.welcome_message {
        session.welcome_message = welcome.clone();
    }
}

/// Apply environment variable overrides on top of the file values
fn apply_env_config<F>(toml: &mut WidgetToml, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("WIDGET_SOCKET_URL") {
        toml.socket_url = Some(url);
    }
    if let Some(url) = env("WIDGET_HISTORY_URL") {
        toml.history_url = Some(url);
    }
    if let Some(users) = env("WIDGET_ALLOWED_USERS") {
        toml.allowed_users = Some(
            users
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect(),
        );
    }

    let session = &mut toml.session;
    if let Some(ms) = env_number(env, "WIDGET_WATCHDOG_MS") {
        session.watchdog_ms = Some(ms);
    }
    if let Some(ms) = env_number(env, "WIDGET_STREAM_TICK_MS") {
        session.stream_tick_ms = Some(ms);
    }
    if let Some(size) = env_number(env, "WIDGET_HISTORY_PAGE_SIZE") {
        session.history_page_size = usize::try_from(size).ok();
    }
    if let Some(ms) = env_number(env, "WIDGET_CONNECT_TIMEOUT_MS") {
        session.connect_timeout_ms = Some(ms);
    }
    if let Some(policy) = env("WIDGET_RECONNECT") {
        session.reconnect = Some(policy.parse()?);
    }
    if let Some(welcome) = env("WIDGET_WELCOME") {
        session.welcome_message = Some(welcome);
    }
    Ok(())
}

fn env_number<F>(env: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!(
                key,
                value = %raw,
                error = %e,
                "Ignoring non-numeric environment override"
            );
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after the environment
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket URL override
    pub socket_url: Option<String>,

    /// History URL override
    pub history_url: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket URL override
    #[must_use]
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = Some(url.into());
        self
    }

    /// Set history URL override
    #[must_use]
    pub fn with_history_url(mut self, url: impl Into<String>) -> Self {
        self.history_url = Some(url.into());
        self
    }

    fn apply(&self, toml: &mut WidgetToml) {
        if let Some(ref url) = self.socket_url {
            toml.socket_url = Some(url.clone());
        }
        if let Some(ref url) = self.history_url {
            toml.history_url = Some(url.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
