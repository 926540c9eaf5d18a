//! Session Types
//!
//! Core type definitions for sessions, users, auth endpoints and configuration.

pub mod auth;
pub mod config;
pub mod session;
pub mod user;

pub use auth::*;
pub use config::*;
pub use session::*;
pub use user::*;
