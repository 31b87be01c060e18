// ============================
// promstream-backend/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use promstream_common::DashboardLayout;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "promstream.toml";
/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "PROMSTREAM_";

const ENV_BASIC_AUTH_USER: &str = "PROMSTREAM_BASIC_AUTH_USER";
const ENV_BASIC_AUTH_PASS: &str = "PROMSTREAM_BASIC_AUTH_PASS";
const ENV_DASHBOARD: &str = "PROMSTREAM_DASHBOARD";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Snapshot interval in milliseconds
    pub tick_interval_ms: u64,
    /// Maximum number of registered subscriber connections
    pub max_connections: usize,
    /// Outstanding payloads per connection before it is evicted
    pub queue_capacity: usize,
    /// URI prefix all routes are mounted under
    pub prefix_uri: String,
    /// HTTP basic auth credentials
    pub basic_auth: Option<BasicAuth>,
    /// Dashboard layout served at `/dashboard`
    pub dashboard: Option<DashboardLayout>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Basic authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9100)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            tick_interval_ms: 1000,
            max_connections: crate::hub::DEFAULT_MAX_CONNECTIONS,
            queue_capacity: crate::connection::DEFAULT_QUEUE_CAPACITY,
            prefix_uri: String::new(),
            basic_auth: None,
            dashboard: None,
        }
    }
}

impl Settings {
    /// Load settings from `promstream.toml` (if present) and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let mut settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&[
                "dashboard",
                "basic_auth",
                "basic_auth_user",
                "basic_auth_pass",
            ]))
            .extract()?;

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.prefix_uri = normalize_prefix(&settings.prefix_uri);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the overrides that don't map onto a single scalar key.
    ///
    /// Credentials need both halves, and the dashboard is a JSON document.
    /// Neither replaces a value that was already configured.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.basic_auth.is_none() {
            let username = lookup(ENV_BASIC_AUTH_USER).unwrap_or_default();
            let password = lookup(ENV_BASIC_AUTH_PASS).unwrap_or_default();
            if !username.is_empty() && !password.is_empty() {
                self.basic_auth = Some(BasicAuth { username, password });
            }
        }

        if self.dashboard.is_none() {
            if let Some(raw) = lookup(ENV_DASHBOARD).filter(|raw| !raw.is_empty()) {
                match serde_json::from_str::<DashboardLayout>(&raw) {
                    Ok(layout) => self.dashboard = Some(layout),
                    Err(e) => tracing::warn!(error = %e, "ignoring unparsable {}", ENV_DASHBOARD),
                }
            }
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), AppError> {
        if self.tick_interval_ms == 0 {
            return Err(AppError::InvalidConfig(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(AppError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(AppError::InvalidConfig(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::InvalidConfig(format!(
                "unknown log level {:?}",
                self.log_level
            )));
        }
        if !self.prefix_uri.is_empty() && !self.prefix_uri.starts_with('/') {
            return Err(AppError::InvalidConfig(format!(
                "prefix_uri {:?} must start with '/'",
                self.prefix_uri
            )));
        }
        Ok(())
    }

    /// Snapshot interval
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Trim trailing slashes so routes can be appended directly
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}
