//! Configuration management for crabscan
//!
//! Provides loading, saving and validation of scanner settings, notification
//! defaults and feedback options. Secrets are never part of the file: the
//! dispatcher reads them from the environment variables named here.

use crate::errors::ConfigError;
use crate::types::ScanConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrabScanConfig {
    pub scanner: ScanConfig,
    pub notification: NotificationConfig,
    pub feedback: FeedbackConfig,
}

/// Arrival notification defaults, resolved before a request is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Send-message endpoint accepting `{ to, subject, text }`
    pub endpoint: String,
    /// Recipient used when the scanned code does not name one
    pub default_recipient: String,
    pub default_subject: String,
    /// Message body; `{timestamp}` and `{payload}` are substituted
    pub body_template: String,
    /// Address the notification to the scanned email, when the code is one
    pub recipient_from_payload: bool,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Accept invalid TLS certificates. Logged loudly when enabled.
    pub allow_insecure_tls: bool,
    /// Environment variable holding a bearer token for the endpoint
    pub auth_token_env: Option<String>,
    /// Environment variables whose values must never appear in error messages
    pub redact_env: Vec<String>,
}

/// Feedback pulse fired on a successful decode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub enabled: bool,
    /// Vibration length in milliseconds
    pub vibrate_ms: u64,
}

pub const DEFAULT_SUBJECT: &str = "STUDENT TIME IN";
pub const DEFAULT_BODY_TEMPLATE: &str = "Student was safely arrived at school at {timestamp}";

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/send-email".to_string(),
            default_recipient: "arrivals@example.com".to_string(),
            default_subject: DEFAULT_SUBJECT.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            recipient_from_payload: true,
            timeout_ms: 10_000,
            allow_insecure_tls: false,
            auth_token_env: None,
            redact_env: vec!["EMAIL_USER".to_string(), "EMAIL_PASS".to_string()],
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vibrate_ms: 100,
        }
    }
}

impl CrabScanConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: CrabScanConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the file (if present) and overlay `CRABSCAN_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CRABSCAN_NOTIFICATION__ENDPOINT` or `CRABSCAN_SCANNER__FRAMES_PER_SECOND`.
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("CRABSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: CrabScanConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabscan.toml")
    }

    /// Load from default location (with environment overrides) or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_layered(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scanner.validate().map_err(ConfigError::Invalid)?;

        let notification = &self.notification;
        if !(notification.endpoint.starts_with("http://")
            || notification.endpoint.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(
                "notification endpoint must be an http(s) URL".to_string(),
            ));
        }
        if !notification.default_recipient.contains('@') {
            return Err(ConfigError::Invalid(
                "default recipient must be an email address".to_string(),
            ));
        }
        if notification.default_subject.trim().is_empty() {
            return Err(ConfigError::Invalid("default subject is empty".to_string()));
        }
        if notification.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "notification timeout must be positive".to_string(),
            ));
        }

        if self.feedback.vibrate_ms > 5_000 {
            return Err(ConfigError::Invalid(
                "vibration must be at most 5000 ms".to_string(),
            ));
        }

        Ok(())
    }
}
