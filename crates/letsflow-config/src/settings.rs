//! Runtime settings
//!
//! Resolved in three layers: built-in defaults, then the YAML config file,
//! then environment variables.

use crate::error::{ConfigError, Result};
use crate::token::ApiToken;
use letsflow_cloud::{ImportDefaults, PollProfile, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://core.letscloud.io/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_TOKEN: &str = "LETSCLOUD_API_TOKEN";
pub const ENV_API_URL: &str = "LETSCLOUD_API_URL";
pub const ENV_CONFIG_PATH: &str = "LETSFLOW_CONFIG_PATH";

/// Upper bound for a single poll interval or retry delay
const MAX_WAIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_token: Option<ApiToken>,

    pub api_url: String,

    pub http_timeout_secs: u64,

    /// Readiness poll when the create call reports no identifier
    pub discovery_poll: PollProfile,

    /// Readiness poll when the identifier is known
    pub tracking_poll: PollProfile,

    pub create_retry: RetryConfig,

    pub import_defaults: ImportDefaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            discovery_poll: PollProfile::long(),
            tracking_poll: PollProfile::short(),
            create_retry: RetryConfig::default(),
            import_defaults: ImportDefaults::default(),
        }
    }
}

impl Settings {
    /// Load settings from the config file (if any) and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override file values with `LETSCLOUD_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            if !token.trim().is_empty() {
                self.api_token = Some(ApiToken::unchecked(token.trim()));
            }
        }
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.trim().is_empty() {
                self.api_url = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    /// Check values that would otherwise fail much later.
    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "api_url は http:// または https:// で始まる必要があります: {}",
                self.api_url
            )));
        }
        if self.discovery_poll.max_attempts == 0 || self.tracking_poll.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_attempts は1以上である必要があります".to_string(),
            ));
        }
        if self.create_retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "create_retry.max_attempts は1以上である必要があります".to_string(),
            ));
        }
        let waits = [
            ("discovery_poll.interval", self.discovery_poll.interval),
            ("tracking_poll.interval", self.tracking_poll.interval),
            ("create_retry.delay", self.create_retry.delay),
        ];
        for (name, wait) in waits {
            if wait > MAX_WAIT {
                return Err(ConfigError::InvalidValue(format!(
                    "{} は{}秒以下である必要があります",
                    name,
                    MAX_WAIT.as_secs()
                )));
            }
        }
        Ok(())
    }

    /// The configured token, validated
    pub fn require_token(&self) -> Result<&ApiToken> {
        let token = self.api_token.as_ref().ok_or(ConfigError::MissingToken)?;
        token.validate()?;
        Ok(token)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Config file location: `LETSFLOW_CONFIG_PATH`, else `~/.config/letsflow/config.yaml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    crate::get_config_dir().ok().map(|dir| dir.join("config.yaml"))
}
