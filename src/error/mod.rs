//! Session Error Types
//!
//! Error hierarchy for session storage, token refresh, and API calls.
//!
//! Every error is `Clone` so a single refresh failure can be handed to each
//! request that was queued behind it.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the session integration.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl SessionError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "SESSION_CONFIG",
            Self::Auth(_) => "SESSION_AUTH",
            Self::Token(_) => "SESSION_TOKEN",
            Self::Network(_) => "SESSION_NETWORK",
            Self::Protocol(_) => "SESSION_PROTOCOL",
            Self::Storage(_) => "SESSION_STORAGE",
            Self::Api(_) => "SESSION_API",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Api(e) => e.is_server_error() || e.status == 429,
            _ => false,
        }
    }

    /// Check if error requires the user to sign in again.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::Unauthorized { .. })
                | Self::Auth(AuthError::NotAuthenticated)
                | Self::Token(TokenError::NoRefreshToken)
                | Self::Token(TokenError::RefreshFailed { .. })
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth(AuthError::Unauthorized { .. }) => Some(401),
            Self::Token(TokenError::RefreshFailed { status, .. }) => *status,
            Self::Api(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("Unknown environment: {name}")]
    UnknownEnvironment { name: String },
}

/// Authentication error.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    #[error("Registration failed: {message}")]
    RegistrationFailed { message: String },

    #[error("No active session")]
    NotAuthenticated,
}

/// Token lifecycle error.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed: {message}")]
    RefreshFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("Token refresh was abandoned before it settled")]
    RefreshCancelled,
}

/// Network/transport error.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl NetworkError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRequest { .. })
    }
}

/// Protocol/response parsing error.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Storage error.
///
/// Backends report these, but the session store logs and swallows them
/// except where an operation cannot be meaningfully degraded.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },

    #[error("Corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("No stored session for user {user_id}")]
    UnknownUser { user_id: String },
}

/// Non-success response from the backend.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    /// Check for a 5xx status.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error body returned by the backend.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<ApiErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Pull the most useful human-readable message out of an error body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    parse_error_response(body)
        .and_then(|r| r.message.or(r.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| match status {
            400 => "Bad request".to_string(),
            401 => "Unauthorized".to_string(),
            403 => "Forbidden".to_string(),
            404 => "Not found".to_string(),
            429 => "Too many requests".to_string(),
            _ => format!("HTTP {}", status),
        })
}

/// Create error from a non-success HTTP response.
pub fn create_error_from_response(status: u16, body: &str) -> SessionError {
    let message = extract_error_message(status, body);
    if status == 401 {
        return SessionError::Auth(AuthError::Unauthorized { message });
    }
    SessionError::Api(ApiError { status, message })
}

/// Get user-friendly error message.
pub fn get_user_message(error: &SessionError) -> String {
    match error {
        SessionError::Auth(AuthError::LoginFailed { message }) => message.clone(),
        SessionError::Auth(AuthError::Unauthorized { .. })
        | SessionError::Auth(AuthError::NotAuthenticated) => {
            "Your session has expired. Please sign in again.".to_string()
        }
        SessionError::Token(TokenError::NoRefreshToken) => {
            "Your session cannot be renewed. Please sign in again.".to_string()
        }
        SessionError::Token(TokenError::RefreshFailed { .. })
        | SessionError::Token(TokenError::RefreshCancelled) => {
            "Failed to refresh your session. Please sign in again.".to_string()
        }
        SessionError::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        SessionError::Network(_) => {
            "Unable to reach the hospital server. Please try again.".to_string()
        }
        SessionError::Api(e) if e.is_server_error() => {
            "The service is temporarily unavailable. Please try again later.".to_string()
        }
        _ => "Something went wrong. Please try again.".to_string(),
    }
}
