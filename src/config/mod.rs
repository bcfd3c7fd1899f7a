//! Configuration management
//!
//! This module handles loading and parsing configuration for skintrack.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend connection configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Authentication rules and guard locations
    #[serde(default)]
    pub auth: AuthConfig,
    /// Chat configuration
    #[serde(default)]
    pub chat: ChatConfig,
    /// Transient notice configuration
    #[serde(default)]
    pub notices: NoticeConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend driver (memory or rest)
    #[serde(default)]
    pub driver: BackendDriver,
    /// Project URL of the hosted backend
    #[serde(default)]
    pub url: Option<String>,
    /// Public (anon) API key sent with every request
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            driver: BackendDriver::default(),
            url: None,
            anon_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Backend driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendDriver {
    /// In-process backend (default, nothing leaves the process)
    #[default]
    Memory,
    /// Hosted Supabase-compatible backend over HTTP
    Rest,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Minimum password length accepted at sign-up
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Where unauthenticated visitors are sent
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Where forbidden visitors are sent, and the post-login fallback
    #[serde(default = "default_home_path")]
    pub home_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: default_min_password_length(),
            login_path: default_login_path(),
            home_path: default_home_path(),
        }
    }
}

fn default_min_password_length() -> usize {
    6
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_home_path() -> String {
    "/".to_string()
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of messages loaded when the chat opens
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Maximum message length in characters
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// How often the REST backend checks for new messages (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_message_length: default_max_message_length(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

fn default_max_message_length() -> usize {
    500
}

fn default_poll_interval_ms() -> u64 {
    2000
}

/// Transient notice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// How long a notice stays visible (milliseconds)
    #[serde(default = "default_notice_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_notice_ttl_ms(),
        }
    }
}

fn default_notice_ttl_ms() -> u64 {
    4000
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SKINTRACK_BACKEND_DRIVER
    /// - SKINTRACK_BACKEND_URL
    /// - SKINTRACK_BACKEND_ANON_KEY
    /// - SKINTRACK_BACKEND_TIMEOUT_SECS
    /// - SKINTRACK_AUTH_MIN_PASSWORD_LENGTH
    /// - SKINTRACK_CHAT_HISTORY_LIMIT
    /// - SKINTRACK_CHAT_POLL_INTERVAL_MS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements the per-field defaults can't express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.driver == BackendDriver::Rest {
            if self.backend.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "backend.url is required for the rest driver".to_string(),
                ));
            }
            if self.backend.anon_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "backend.anon_key is required for the rest driver".to_string(),
                ));
            }
        }
        if !self.auth.login_path.starts_with('/') || !self.auth.home_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "auth paths must be absolute".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(driver) = std::env::var("SKINTRACK_BACKEND_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.backend.driver = BackendDriver::Memory,
                "rest" => self.backend.driver = BackendDriver::Rest,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SKINTRACK_BACKEND_URL") {
            self.backend.url = Some(url);
        }
        if let Ok(key) = std::env::var("SKINTRACK_BACKEND_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Ok(timeout) = std::env::var("SKINTRACK_BACKEND_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.backend.timeout_secs = timeout;
            }
        }

        if let Ok(len) = std::env::var("SKINTRACK_AUTH_MIN_PASSWORD_LENGTH") {
            if let Ok(len) = len.parse::<usize>() {
                self.auth.min_password_length = len;
            }
        }

        if let Ok(limit) = std::env::var("SKINTRACK_CHAT_HISTORY_LIMIT") {
            if let Ok(limit) = limit.parse::<usize>() {
                self.chat.history_limit = limit;
            }
        }
        if let Ok(interval) = std::env::var("SKINTRACK_CHAT_POLL_INTERVAL_MS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.chat.poll_interval_ms = interval;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "SKINTRACK_BACKEND_DRIVER",
    "SKINTRACK_BACKEND_URL",
    "SKINTRACK_BACKEND_ANON_KEY",
    "SKINTRACK_BACKEND_TIMEOUT_SECS",
    "SKINTRACK_AUTH_MIN_PASSWORD_LENGTH",
    "SKINTRACK_CHAT_HISTORY_LIMIT",
    "SKINTRACK_CHAT_POLL_INTERVAL_MS",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for key in super::ENV_KEYS {
            std::env::remove_var(key);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.backend.driver, BackendDriver::Memory);
        assert_eq!(config.backend.url, None);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.auth.min_password_length, 6);
        assert_eq!(config.auth.login_path, "/login");
        assert_eq!(config.auth.home_path, "/");
        assert_eq!(config.chat.history_limit, 50);
        assert_eq!(config.chat.max_message_length, 500);
        assert_eq!(config.notices.ttl_ms, 4000);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.backend.driver, BackendDriver::Memory);
        assert_eq!(config.chat.history_limit, 50);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chat:\n  history_limit: 20\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.chat.history_limit, 20);
        assert_eq!(config.chat.poll_interval_ms, 2000);
        assert_eq!(config.auth.min_password_length, 6);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"
backend:
  driver: rest
  url: "https://project.supabase.co"
  anon_key: "public-anon-key"
  timeout_secs: 10
auth:
  min_password_length: 8
  login_path: "/signin"
  home_path: "/heroes"
chat:
  history_limit: 100
  max_message_length: 280
  poll_interval_ms: 500
notices:
  ttl_ms: 1500
"#).unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.backend.driver, BackendDriver::Rest);
        assert_eq!(config.backend.url.as_deref(), Some("https://project.supabase.co"));
        assert_eq!(config.backend.anon_key.as_deref(), Some("public-anon-key"));
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.auth.min_password_length, 8);
        assert_eq!(config.auth.login_path, "/signin");
        assert_eq!(config.auth.home_path, "/heroes");
        assert_eq!(config.chat.history_limit, 100);
        assert_eq!(config.chat.max_message_length, 280);
        assert_eq!(config.chat.poll_interval_ms, 500);
        assert_eq!(config.notices.ttl_ms, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chat:\n  history_limit: not_a_number\n").unwrap();

        let result = Config::load(file.path());

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("parse"));
    }

    #[test]
    fn test_load_malformed_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "backend:\n  url: [invalid yaml").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_rest_requires_url_and_key() {
        let mut config = Config::default();
        config.backend.driver = BackendDriver::Rest;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.backend.url = Some("https://project.supabase.co".to_string());
        assert!(config.validate().is_err());

        config.backend.anon_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_relative_auth_path_rejected() {
        let mut config = Config::default();
        config.auth.login_path = "login".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_backend_config() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("SKINTRACK_BACKEND_DRIVER", "REST");
        std::env::set_var("SKINTRACK_BACKEND_URL", "https://env.supabase.co");
        std::env::set_var("SKINTRACK_BACKEND_ANON_KEY", "env-key");
        std::env::set_var("SKINTRACK_BACKEND_TIMEOUT_SECS", "5");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.backend.driver, BackendDriver::Rest);
        assert_eq!(config.backend.url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(config.backend.anon_key.as_deref(), Some("env-key"));
        assert_eq!(config.backend.timeout_secs, 5);

        for key in super::ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_chat_and_auth_config() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "chat:\n  history_limit: 10\n").unwrap();

        std::env::set_var("SKINTRACK_CHAT_HISTORY_LIMIT", "75");
        std::env::set_var("SKINTRACK_CHAT_POLL_INTERVAL_MS", "250");
        std::env::set_var("SKINTRACK_AUTH_MIN_PASSWORD_LENGTH", "10");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.chat.history_limit, 75);
        assert_eq!(config.chat.poll_interval_ms, 250);
        assert_eq!(config.auth.min_password_length, 10);

        for key in super::ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "backend:\n  timeout_secs: 12\n").unwrap();

        std::env::set_var("SKINTRACK_BACKEND_DRIVER", "carrier-pigeon");
        std::env::set_var("SKINTRACK_BACKEND_TIMEOUT_SECS", "soon");

        let config = Config::load_with_env(file.path()).unwrap();

        // Should keep original values when env vars are invalid
        assert_eq!(config.backend.driver, BackendDriver::Memory);
        assert_eq!(config.backend.timeout_secs, 12);

        for key in super::ENV_KEYS {
            std::env::remove_var(key);
        }
    }
}
