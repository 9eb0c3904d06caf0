//! Configuration management for Tuneboard
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every section has defaults, so a bare checkout talks to a Training
//! Backend on `http://localhost:8000` without any file present.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Training Backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Document Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Auth Provider configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Status polling configuration
    #[serde(default)]
    pub polling: PollingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the Training Backend
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Directory downloaded models are written to
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Document Store base URL (PostgREST host). `None` means in-memory.
    pub url: Option<String>,

    /// Public API key sent as the `apikey` header
    pub api_key: Option<String>,

    /// Table holding document records
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Auth Provider base URL (falls back to the store URL)
    pub url: Option<String>,

    /// Public API key sent as the `apikey` header (falls back to the store key)
    pub api_key: Option<String>,

    /// Where the CLI keeps the current session
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Delay before the single retry after a rate-limited sign-in
    #[serde(default = "default_rate_limit_retry")]
    pub rate_limit_retry_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Period of the status polling loop
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Per-index delay between model status refreshes after a list reload
    #[serde(default = "default_stagger")]
    pub stagger_ms: u64,

    /// Delay before the first training poll after training is accepted
    #[serde(default = "default_first_poll_delay")]
    pub first_poll_delay_ms: u64,

    /// Progress shown right after training is accepted when the backend
    /// does not report one
    #[serde(default = "default_start_progress")]
    pub start_progress: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,
}

// Default value functions
fn default_backend_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_download_dir() -> PathBuf { PathBuf::from(".") }
fn default_table() -> String { "documents".to_string() }
fn default_session_file() -> PathBuf { PathBuf::from(".tuneboard/session.json") }
fn default_rate_limit_retry() -> u64 { 700 }
fn default_poll_interval() -> u64 { 3000 }
fn default_stagger() -> u64 { 200 }
fn default_first_poll_delay() -> u64 { 1000 }
fn default_start_progress() -> f64 { 5.0 }
fn default_log_level() -> String { "info".to_string() }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_request_timeout(),
            download_dir: default_download_dir(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: default_table(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            session_file: default_session_file(),
            rate_limit_retry_ms: default_rate_limit_retry(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            stagger_ms: default_stagger(),
            first_poll_delay_ms: default_first_poll_delay(),
            start_progress: default_start_progress(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            metrics_port: 0,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn first_poll_delay(&self) -> Duration {
        Duration::from_millis(self.first_poll_delay_ms)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__BACKEND__BASE_URL=http://gpu-box:8000
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the polling loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Message(
                "polling.interval_ms must be > 0".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.polling.start_progress) {
            return Err(ConfigError::Message(
                "polling.start_progress must be in [0, 100]".to_string(),
            ));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "backend.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get backend request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    /// Get the auth URL (falls back to the document store URL)
    pub fn auth_url(&self) -> Option<&str> {
        self.auth.url.as_deref().or(self.store.url.as_deref())
    }

    /// Get the auth API key (falls back to the document store key)
    pub fn auth_api_key(&self) -> Option<&str> {
        self.auth.api_key.as_deref().or(self.store.api_key.as_deref())
    }
}
