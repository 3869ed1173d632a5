//! Client Configuration
//!
//! Centralized configuration loading for the chat client, supporting a TOML
//! file at `~/.config/chatline/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! url = "https://chat.example.com"
//! request_timeout_secs = 120
//! require_auth = true
//!
//! [stream]
//! default_model = "gemini-2.0-flash"
//! flush_interval_ms = 120
//! ```
//!
//! # Environment Variables
//!
//! - `CHATLINE_BACKEND_URL` (falls back to `BACKEND_URL`)
//! - `CHATLINE_MODEL`
//! - `CHATLINE_FLUSH_INTERVAL_MS`
//! - `CHATLINE_REQUEST_TIMEOUT_SECS`
//! - `CHATLINE_REQUIRE_AUTH`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model used when neither the caller nor the configuration names one
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default interval between token buffer flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(120);

/// Default timeout for history and other non-streaming HTTP requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
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
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Base URL of the chat API
    pub url: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Refuse to send without a credential
    pub require_auth: Option<bool>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Default model name
    pub default_model: Option<String>,

    /// Token flush interval in milliseconds
    pub flush_interval_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatlineToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Stream configuration section
    pub stream: StreamToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat API (no trailing slash); `None` means unconfigured
    pub backend_url: Option<String>,

    /// Model sent when the caller does not pick one
    pub default_model: String,

    /// How often buffered tokens are applied to visible state
    pub flush_interval: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Whether sending requires an available credential
    pub require_auth: bool,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            default_model: DEFAULT_MODEL.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            require_auth: false,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration pointing at a backend
    #[must_use]
    pub fn with_backend(url: impl Into<String>) -> Self {
        Self {
            backend_url: Some(normalize_url(&url.into())),
            ..Self::default()
        }
    }

    /// Set the flush interval
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that cannot be expressed by the types alone
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a zero flush interval or a
    /// backend URL that does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        if let Some(ref url) = self.backend_url {
            reqwest::Url::parse(url).map_err(|e| {
                ConfigError::ValidationError(format!("invalid backend url {url:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chatline/config.toml` or
/// `~/.config/chatline/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatline").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resulting values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the resulting values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using a custom environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatlineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

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

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ChatlineToml) {
    if let Some(ref url) = toml.backend.url {
        config.backend_url = Some(normalize_url(url));
    }
    if let Some(secs) = toml.backend.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(require) = toml.backend.require_auth {
        config.require_auth = require;
    }

    if let Some(ref model) = toml.stream.default_model {
        config.default_model.clone_from(model);
    }
    if let Some(ms) = toml.stream.flush_interval_ms {
        config.flush_interval = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("CHATLINE_BACKEND_URL").or_else(|| env("BACKEND_URL")) {
        if !url.trim().is_empty() {
            config.backend_url = Some(normalize_url(&url));
            config.source = ConfigSource::Env;
        }
    }
    if let Some(model) = env("CHATLINE_MODEL") {
        config.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = env("CHATLINE_FLUSH_INTERVAL_MS") {
        if let Ok(ms) = interval.parse::<u64>() {
            config.flush_interval = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("CHATLINE_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(require) = env("CHATLINE_REQUIRE_AUTH") {
        config.require_auth = require != "0" && require.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend URL override
    pub backend_url: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Flush interval override (milliseconds)
    pub flush_interval_ms: Option<u64>,

    /// Require-auth override
    pub require_auth: Option<bool>,
}

impl ConfigOverrides {
    /// Apply the overrides
    ///
    /// # Errors
    ///
    /// Returns an error when the overridden configuration fails validation.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        let mut changed = false;

        if let Some(ref url) = self.backend_url {
            config.backend_url = Some(normalize_url(url));
            changed = true;
        }
        if let Some(ref model) = self.model {
            config.default_model.clone_from(model);
            changed = true;
        }
        if let Some(ms) = self.flush_interval_ms {
            config.flush_interval = Duration::from_millis(ms);
            changed = true;
        }
        if let Some(require) = self.require_auth {
            config.require_auth = require;
            changed = true;
        }

        if changed {
            config.source = ConfigSource::Cli;
        }
        config.validate()
    }
}
