//! Token Handling
//!
//! Everything between an outgoing request and a fresh access token.
//!
//! - **Interceptor**: attaches the active bearer credential
//! - **Refresher**: the `/auth/refresh` call
//! - **Coordinator**: single-flight refresh with a FIFO waiter queue

pub mod coordinator;
pub mod interceptor;
pub mod refresher;

// Interceptor
pub use interceptor::{BearerInterceptor, RequestInterceptor};

// Refresher
pub use refresher::{HttpTokenRefresher, MockTokenRefresher, TokenRefresher};

// Coordinator
pub use coordinator::{RefreshCoordinator, RefreshStats};
