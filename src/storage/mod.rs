//! Session Storage
//!
//! Per-user persistence of token pairs and profiles.
//!
//! - **Backends**: string key/value stores (memory, JSON file, mock)
//! - **Session store**: typed multi-account layer with an active-user pointer

pub mod backend;
pub mod session_store;

pub use backend::{FileStorageBackend, InMemoryStorageBackend, MockStorageBackend, StorageBackend};
pub use session_store::{SessionStore, ACTIVE_USER_KEY, SESSION_TOKENS_KEY, USER_PROFILES_KEY};

use std::path::Path;
use std::sync::Arc;

/// Create a file backend for `path`, or a memory backend when `None`.
pub fn create_storage_backend(path: Option<&Path>) -> Arc<dyn StorageBackend> {
    match path {
        Some(path) => Arc::new(FileStorageBackend::new(path)),
        None => Arc::new(InMemoryStorageBackend::new()),
    }
}
