//! Configuration Types
//!
//! Client configuration for the hospital API session integration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, SessionError, SessionResult};

/// Base URL used when running against a local backend.
pub const DEVELOPMENT_BASE_URL: &str = "http://localhost:5000";
/// Path prefix every REST endpoint lives under.
pub const API_PREFIX: &str = "/api";
/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Deployment environment, selecting the default base URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigurationError::UnknownEnvironment {
                name: other.to_string(),
            }),
        }
    }
}

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend origin, without the `/api` prefix.
    pub base_url: String,
    /// Environment the base URL was selected for.
    pub environment: Environment,
    /// HTTP timeout for ordinary requests.
    pub timeout: Duration,
    /// Upper bound on a token refresh. `None` waits indefinitely.
    pub refresh_timeout: Option<Duration>,
    /// File to persist sessions in. `None` keeps them in memory.
    pub storage_path: Option<PathBuf>,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEVELOPMENT_BASE_URL.to_string(),
            environment: Environment::Development,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refresh_timeout: None,
            storage_path: None,
            user_agent: format!("hms-session-integration/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a configuration builder.
    pub fn builder() -> crate::builders::ClientConfigBuilder {
        crate::builders::ClientConfigBuilder::new()
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `HMS_ENV`, `HMS_API_BASE_URL`, `HMS_TIMEOUT_SECS`,
    /// `HMS_REFRESH_TIMEOUT_SECS` and `HMS_STORAGE_PATH`.
    pub fn from_env() -> SessionResult<Self> {
        let mut builder = Self::builder();

        if let Ok(env) = std::env::var("HMS_ENV") {
            builder = builder.environment(env.parse::<Environment>()?);
        }

        if let Ok(base_url) = std::env::var("HMS_API_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Some(secs) = std::env::var("HMS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(secs) = std::env::var("HMS_REFRESH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            builder = builder.refresh_timeout(Duration::from_secs(secs));
        }

        if let Ok(path) = std::env::var("HMS_STORAGE_PATH") {
            builder = builder.storage_path(path);
        }

        builder.build()
    }

    /// Full URL of an API endpoint, e.g. `endpoint("/auth/login")`.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}{}/{}", base, API_PREFIX, path)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), SessionError> {
        let parsed = Url::parse(&self.base_url).map_err(|_| ConfigurationError::InvalidBaseUrl {
            url: self.base_url.clone(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ConfigurationError::InvalidBaseUrl {
                url: self.base_url.clone(),
            }
            .into());
        }

        if self.timeout.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            }
            .into());
        }

        if matches!(self.refresh_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigurationError::InvalidConfig {
                message: "refresh timeout must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
