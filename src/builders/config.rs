//! Configuration Builder
//!
//! Fluent builder for client configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigurationError, SessionError};
use crate::types::{ClientConfig, Environment, DEFAULT_TIMEOUT_SECS, DEVELOPMENT_BASE_URL};

/// Client configuration builder.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    environment: Environment,
    timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
    storage_path: Option<PathBuf>,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend origin (without `/api`).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set deployment environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the time a token refresh may take.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Persist sessions to a file instead of memory.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Set User-Agent header value.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the configuration.
    ///
    /// Development falls back to the local backend; production requires an
    /// explicit base URL.
    pub fn build(self) -> Result<ClientConfig, SessionError> {
        let base_url = match (self.base_url, self.environment) {
            (Some(url), _) => url,
            (None, Environment::Development) => DEVELOPMENT_BASE_URL.to_string(),
            (None, Environment::Production) => {
                return Err(ConfigurationError::MissingRequired {
                    field: "base_url".to_string(),
                }
                .into())
            }
        };

        let defaults = ClientConfig::default();
        let config = ClientConfig {
            base_url,
            environment: self.environment,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            refresh_timeout: self.refresh_timeout,
            storage_path: self.storage_path,
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Create a new client configuration builder.
pub fn session_config() -> ClientConfigBuilder {
    ClientConfigBuilder::new()
}
