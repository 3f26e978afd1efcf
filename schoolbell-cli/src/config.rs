use std::path::{Path, PathBuf};
use std::time::Duration;

use schoolbell::{ClientConfig, PermissionState, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

/// Settings read from `config.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend origin
    pub base_url: String,
    /// Bearer token; usually supplied through SCHOOLBELL_TOKEN instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub push: PushSettings,
    pub alerts: PermissionState,
    pub colored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    pub heartbeat_secs: u64,
    pub reconnect_base_secs: u64,
    pub reconnect_max_secs: u64,
    pub jitter: bool,
    /// Unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            request_timeout_secs: 30,
            push: PushSettings::default(),
            alerts: PermissionState::Default,
            colored: true,
        }
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            reconnect_base_secs: 5,
            reconnect_max_secs: 60,
            jitter: true,
            max_reconnect_attempts: None,
        }
    }
}

impl AppConfig {
    /// `<config dir>/schoolbell/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("schoolbell").join("config.toml"))
    }

    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply command-line and environment overrides.
    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = url {
            self.base_url = url;
        }
        if token.is_some() {
            self.token = token;
        }
        self
    }

    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AppError::MissingToken)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let push = &self.push;
        if push.heartbeat_secs == 0 {
            return Err(AppError::InvalidInput(
                "push.heartbeat_secs must be at least 1".to_string(),
            ));
        }
        let mut reconnect = ReconnectPolicy {
            base_delay: Duration::from_secs(push.reconnect_base_secs),
            max_delay: Duration::from_secs(push.reconnect_max_secs.max(push.reconnect_base_secs)),
            jitter: push.jitter,
            max_attempts: None,
        };
        if let Some(max) = push.max_reconnect_attempts {
            reconnect = reconnect.with_max_attempts(max);
        }

        let config = ClientConfig::new(&self.base_url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_heartbeat_interval(Duration::from_secs(push.heartbeat_secs))
            .with_reconnect(reconnect);
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML with the token masked.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.token.is_some() {
            shown.token = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}
