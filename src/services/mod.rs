//! Services
//!
//! Endpoint wrappers built on [`ApiClient`](crate::client::ApiClient).

pub mod auth;

pub use auth::AuthService;
