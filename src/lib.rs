//! Hospital API Session Integration
//!
//! Multi-account token sessions for the hospital management backend.
//!
//! # Features
//!
//! - Per-user token pairs and profiles with an active-account pointer
//! - Write-through persistence (memory or JSON file) that never fails a caller
//! - Bearer credential attached to every authenticated request
//! - Single-flight token refresh: concurrent 401s share one `/auth/refresh`
//!   call and are replayed, in arrival order, with the new token
//! - Auth endpoints (login, register, logout, OTP, password reset)
//!
//! # Example
//!
//! ```rust,ignore
//! use hms_session_integration::{session_config, ApiClient, Environment, LoginCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = session_config()
//!         .environment(Environment::Production)
//!         .base_url("https://hms.example.org")
//!         .storage_path("/var/lib/hms/sessions.json")
//!         .build()?;
//!
//!     let client = ApiClient::new(config).await?;
//!
//!     client
//!         .auth()
//!         .login(&LoginCredentials::new("asha@example.org", "secret"))
//!         .await?;
//!
//!     // Expired access tokens are refreshed transparently.
//!     let appointments: serde_json::Value = client.get_json("/appointments").await?;
//!     println!("{}", appointments);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: sessions, profiles, auth bodies and configuration
//! - `error`: error hierarchy and response mapping
//! - `core`: HTTP transport
//! - `storage`: storage backends and the multi-account session store
//! - `token`: bearer interceptor, refresher and refresh coordinator
//! - `client`: request pipeline with 401 recovery
//! - `services`: auth endpoints
//! - `builders`: fluent configuration builder
//! - `telemetry`: logging setup and metrics

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{api_client, ApiClient, ApiRequest};

// Re-export services
pub use services::AuthService;

// Re-export builders
pub use builders::{session_config, ClientConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_response, extract_error_message, get_user_message, parse_error_response,
    ApiError, ApiErrorResponse, AuthError, ConfigurationError, NetworkError, ProtocolError,
    SessionError, SessionResult, StorageError, TokenError,
};

// Re-export types
pub use types::{
    // Session
    SessionRecord, TokenPairResponse, UserId,
    // User
    AccountSummary, Role, UserProfile,
    // Auth
    LoginCredentials, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest,
    // Config
    ClientConfig, Environment, API_PREFIX, DEFAULT_TIMEOUT_SECS, DEVELOPMENT_BASE_URL,
};

// Re-export core components
pub use core::{
    create_mock_transport, create_transport, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export storage
pub use storage::{
    create_storage_backend, FileStorageBackend, InMemoryStorageBackend, MockStorageBackend,
    SessionStore, StorageBackend,
};

// Re-export token handling
pub use token::{
    BearerInterceptor, HttpTokenRefresher, MockTokenRefresher, RefreshCoordinator, RefreshStats,
    RequestInterceptor, TokenRefresher,
};

// Re-export telemetry
pub use telemetry::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, LogFormat, LogLevel,
    LoggingConfig, MetricEntry, NoOpMetrics, SessionMetricNames, SessionMetrics,
};
