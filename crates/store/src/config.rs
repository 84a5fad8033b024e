use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Message store configuration loaded from companion.toml with env var overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the hosted backend, without the `/rest/v1` suffix.
    pub remote_url: String,
    /// Public API key sent as the `apikey` header. Default: ""
    #[serde(default)]
    pub remote_api_key: String,
    /// Whole-request timeout. Default: 15
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// TCP connect timeout. Default: 5
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Path of the encrypted local cache database. Default: "companion-cache.db"
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,
    /// Lifetime of a cached full-session read. Default: 300
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Lifetime of a cached page. Default: 120
    #[serde(default = "default_page_ttl_secs")]
    pub page_ttl_secs: u64,
    /// Issue process-local keys when the OS keychain is unavailable. Default: false
    #[serde(default)]
    pub allow_degraded_keys: bool,
    /// Tracing log level. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_request_timeout_secs() -> u64 {
    15
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_cache_db_path() -> PathBuf {
    PathBuf::from("companion-cache.db")
}
fn default_session_ttl_secs() -> u64 {
    companion_shared::constants::DEFAULT_SESSION_TTL.as_secs()
}
fn default_page_ttl_secs() -> u64 {
    companion_shared::constants::DEFAULT_PAGE_TTL.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            remote_api_key: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            cache_db_path: default_cache_db_path(),
            session_ttl_secs: default_session_ttl_secs(),
            page_ttl_secs: default_page_ttl_secs(),
            allow_degraded_keys: false,
            log_level: default_log_level(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, ConfigError> {
    val.parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid {name} value: {val}")))
}

impl StoreConfig {
    /// Load configuration from TOML file with environment variable overrides.
    ///
    /// Reads `companion.toml` from CWD (or the path in `CONFIG_PATH`).
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "companion.toml".to_string());
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a TOML string, apply env var overrides, then validate.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: StoreConfig = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// An env var that is set but malformed is an error, not ignored.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("COMPANION_REMOTE_URL") {
            self.remote_url = val;
        }
        if let Ok(val) = std::env::var("COMPANION_REMOTE_API_KEY") {
            self.remote_api_key = val;
        }
        if let Ok(val) = std::env::var("COMPANION_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("COMPANION_REQUEST_TIMEOUT_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("COMPANION_CACHE_DB_PATH") {
            self.cache_db_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("COMPANION_SESSION_TTL_SECS") {
            self.session_ttl_secs = parse_env("COMPANION_SESSION_TTL_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("COMPANION_PAGE_TTL_SECS") {
            self.page_ttl_secs = parse_env("COMPANION_PAGE_TTL_SECS", &val)?;
        }
        if let Ok(val) = std::env::var("COMPANION_ALLOW_DEGRADED_KEYS") {
            self.allow_degraded_keys = parse_env("COMPANION_ALLOW_DEGRADED_KEYS", &val)?;
        }
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_url.trim().is_empty() {
            return Err(ConfigError::Invalid("remote_url must not be empty".into()));
        }
        for (name, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("session_ttl_secs", self.session_ttl_secs),
            ("page_ttl_secs", self.page_ttl_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_secs)
    }
}
