use serde::Deserialize;

use crate::models::ExternalSource;

fn default_timeout() -> i64 {
    300
}

fn default_sync_interval() -> i64 {
    3600
}

/// Application-level defaults, loadable from a TOML file. A missing file
/// yields the defaults.
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    /// Fallback timeout in seconds for HTTP fetches when a source has none.
    #[serde(default = "default_timeout")]
    pub default_timeout: i64,
    /// Fallback interval in seconds between periodic sync runs.
    #[serde(default = "default_sync_interval")]
    pub default_sync_interval: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            default_sync_interval: default_sync_interval(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-wide overrides, read fresh at each call site so a rotated
/// credential takes effect on the next sync without a restart.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<i64>,
    pub sync_interval: Option<i64>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            username: std::env::var("EXTERNAL_API_USERNAME").ok(),
            password: std::env::var("EXTERNAL_API_PASSWORD").ok(),
            timeout: std::env::var("FETCH_DATA_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok()),
            sync_interval: std::env::var("SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Env beats the stored source credential.
    pub fn resolve_username(&self, source: &ExternalSource) -> Option<String> {
        self.username.clone().or_else(|| source.auth_username.clone())
    }

    pub fn resolve_password(&self, source: &ExternalSource) -> Option<String> {
        self.password.clone().or_else(|| source.auth_password.clone())
    }

    /// Env beats the source setting, which beats the config default.
    pub fn resolve_timeout(&self, source: &ExternalSource, config: &AppConfig) -> i64 {
        self.timeout.unwrap_or(if source.timeout > 0 {
            source.timeout
        } else {
            config.default_timeout
        })
    }
}
