//! Core Components
//!
//! Core infrastructure shared by the session layers.

pub mod transport;

pub use transport::*;
