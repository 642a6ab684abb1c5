//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `CLASSBOOK_API_URL` - Base URL of the class server (default: `http://localhost:5500`)
//! - `CLASSBOOK_STATE_FILE` - Session store path (default: `.classbook/session.json`)
//! - `CLASSBOOK_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `CLASSBOOK_ON_REFRESH_REJECTED` - `logout` or `keep` (default: `logout`)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::session::RefreshRejectedPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:5500";
pub const DEFAULT_STATE_FILE: &str = ".classbook/session.json";
const DEFAULT_HTTP_TIMEOUT_SECS: &str = "30";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Classbook client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the class server
    pub api_url: Url,
    /// Where the session store lives
    pub state_file: PathBuf,
    /// Timeout applied to every HTTP request
    pub http_timeout: Duration,
    /// What to do with stored credentials when a refresh token is rejected
    pub on_refresh_rejected: RefreshRejectedPolicy,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get_env_or_default = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api_url = parse_api_url(&get_env_or_default("CLASSBOOK_API_URL", DEFAULT_API_URL))?;
        let state_file = PathBuf::from(get_env_or_default("CLASSBOOK_STATE_FILE", DEFAULT_STATE_FILE));
        let http_timeout = parse_seconds(
            "CLASSBOOK_HTTP_TIMEOUT_SECS",
            &get_env_or_default("CLASSBOOK_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
        )?;
        let on_refresh_rejected = get_env_or_default(
            "CLASSBOOK_ON_REFRESH_REJECTED",
            RefreshRejectedPolicy::default().as_str(),
        )
        .parse::<RefreshRejectedPolicy>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("CLASSBOOK_ON_REFRESH_REJECTED".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_url,
            state_file,
            http_timeout,
            on_refresh_rejected,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("CLASSBOOK_API_URL".to_string(), reason);

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment".to_string()));
    }
    Ok(url)
}

/// Parse a positive number of seconds.
fn parse_seconds(key: &str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}
