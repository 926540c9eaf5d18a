//! Session Store
//!
//! Typed multi-account session storage with an active-user pointer.
//!
//! The in-memory maps are authoritative. Every mutation is written through
//! to the [`StorageBackend`]; backend failures are logged and counted but
//! never surface to callers, so a full or broken store degrades to
//! "session not found" on the next start instead of breaking requests.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{InMemoryStorageBackend, StorageBackend};
use crate::error::{SessionError, StorageError};
use crate::telemetry::{NoOpMetrics, SessionMetrics};
use crate::types::{AccountSummary, SessionRecord, UserId, UserProfile};

/// Backend key holding the user → session record map.
pub const SESSION_TOKENS_KEY: &str = "session_tokens";
/// Backend key holding the user → profile map.
pub const USER_PROFILES_KEY: &str = "user_profiles";
/// Backend key holding the active user id.
pub const ACTIVE_USER_KEY: &str = "active_user";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StoredKey {
    Sessions,
    Profiles,
    Active,
}

impl StoredKey {
    fn name(&self) -> &'static str {
        match self {
            Self::Sessions => SESSION_TOKENS_KEY,
            Self::Profiles => USER_PROFILES_KEY,
            Self::Active => ACTIVE_USER_KEY,
        }
    }
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<UserId, SessionRecord>,
    profiles: HashMap<UserId, UserProfile>,
    active: Option<UserId>,
}

/// Multi-account session store.
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    state: RwLock<SessionState>,
    persist_lock: tokio::sync::Mutex<()>,
    metrics: Arc<dyn SessionMetrics>,
}

impl SessionStore {
    /// Create an empty store backed by memory only.
    pub fn in_memory() -> Self {
        Self::empty(Arc::new(InMemoryStorageBackend::new()), Arc::new(NoOpMetrics))
    }

    fn empty(backend: Arc<dyn StorageBackend>, metrics: Arc<dyn SessionMetrics>) -> Self {
        Self {
            backend,
            state: RwLock::new(SessionState::default()),
            persist_lock: tokio::sync::Mutex::new(()),
            metrics,
        }
    }

    /// Load previously persisted sessions from `backend`.
    ///
    /// Unreadable or corrupt documents are treated as absent.
    pub async fn load(backend: Arc<dyn StorageBackend>) -> Self {
        Self::load_with_metrics(backend, Arc::new(NoOpMetrics)).await
    }

    /// Load with a metrics sink for storage failures.
    pub async fn load_with_metrics(
        backend: Arc<dyn StorageBackend>,
        metrics: Arc<dyn SessionMetrics>,
    ) -> Self {
        let store = Self::empty(backend, metrics);

        let sessions: HashMap<UserId, SessionRecord> =
            store.read_json(StoredKey::Sessions).await.unwrap_or_default();
        let profiles: HashMap<UserId, UserProfile> =
            store.read_json(StoredKey::Profiles).await.unwrap_or_default();
        let active = store
            .read_raw(StoredKey::Active)
            .await
            .filter(|id| !id.is_empty())
            .map(UserId::from);

        debug!(
            accounts = sessions.len(),
            active = active.as_ref().map(UserId::as_str),
            "Loaded session store"
        );

        {
            let mut state = store.state.write();
            state.sessions = sessions;
            state.profiles = profiles;
            state.active = active;
        }

        store
    }

    /// Write or clear the session for `user_id` and make it the active user.
    pub async fn set_session(&self, user_id: &UserId, session: Option<SessionRecord>) {
        let mut changed = vec![StoredKey::Sessions, StoredKey::Active];
        {
            let mut state = self.state.write();
            match session {
                Some(record) => {
                    state.sessions.insert(user_id.clone(), record);
                }
                None => {
                    state.sessions.remove(user_id);
                    if state.profiles.remove(user_id).is_some() {
                        changed.push(StoredKey::Profiles);
                    }
                }
            }
            state.active = Some(user_id.clone());
        }
        self.persist(&changed).await;
    }

    /// Replace the tokens of `user_id` if its stored record still carries
    /// `expected_refresh`. The active pointer is not touched.
    ///
    /// Returns `false` without writing when the session was cleared or
    /// replaced in the meantime.
    pub async fn replace_tokens_if(
        &self,
        user_id: &UserId,
        expected_refresh: &str,
        session: SessionRecord,
    ) -> bool {
        {
            let mut state = self.state.write();
            let current = state
                .sessions
                .get(user_id)
                .and_then(SessionRecord::refresh_token);
            if current != Some(expected_refresh) {
                return false;
            }
            state.sessions.insert(user_id.clone(), session);
        }
        self.persist(&[StoredKey::Sessions]).await;
        true
    }

    /// Session of the active user, if both exist.
    pub fn get_active_session(&self) -> Option<SessionRecord> {
        let state = self.state.read();
        state
            .active
            .as_ref()
            .and_then(|id| state.sessions.get(id))
            .cloned()
    }

    /// Active user together with its session.
    pub fn active_entry(&self) -> Option<(UserId, SessionRecord)> {
        let state = self.state.read();
        let id = state.active.as_ref()?;
        state
            .sessions
            .get(id)
            .map(|record| (id.clone(), record.clone()))
    }

    /// Remove the session of `user_id`, leaving the active pointer alone.
    pub async fn clear_session(&self, user_id: &UserId) {
        let mut changed = Vec::new();
        {
            let mut state = self.state.write();
            if state.sessions.remove(user_id).is_some() {
                changed.push(StoredKey::Sessions);
            }
            if state.profiles.remove(user_id).is_some() {
                changed.push(StoredKey::Profiles);
            }
        }
        if !changed.is_empty() {
            self.persist(&changed).await;
        }
    }

    pub fn active_user_id(&self) -> Option<UserId> {
        self.state.read().active.clone()
    }

    pub fn get_session(&self, user_id: &UserId) -> Option<SessionRecord> {
        self.state.read().sessions.get(user_id).cloned()
    }

    pub async fn set_profile(&self, user_id: &UserId, profile: UserProfile) {
        self.state
            .write()
            .profiles
            .insert(user_id.clone(), profile);
        self.persist(&[StoredKey::Profiles]).await;
    }

    pub fn get_profile(&self, user_id: &UserId) -> Option<UserProfile> {
        self.state.read().profiles.get(user_id).cloned()
    }

    pub fn get_active_profile(&self) -> Option<UserProfile> {
        let state = self.state.read();
        state
            .active
            .as_ref()
            .and_then(|id| state.profiles.get(id))
            .cloned()
    }

    /// Every account holding a session, ordered by user id.
    pub fn list_accounts(&self) -> Vec<AccountSummary> {
        let state = self.state.read();
        let mut accounts: Vec<AccountSummary> = state
            .sessions
            .keys()
            .map(|id| AccountSummary {
                user_id: id.clone(),
                profile: state.profiles.get(id).cloned(),
                is_active: state.active.as_ref() == Some(id),
            })
            .collect();
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        accounts
    }

    /// Point the active user at an account that already has a session.
    pub async fn switch_active_user(&self, user_id: &UserId) -> Result<(), SessionError> {
        {
            let mut state = self.state.write();
            if !state.sessions.contains_key(user_id) {
                return Err(StorageError::UnknownUser {
                    user_id: user_id.to_string(),
                }
                .into());
            }
            state.active = Some(user_id.clone());
        }
        self.persist(&[StoredKey::Active]).await;
        Ok(())
    }

    /// Drop every account and the active pointer.
    pub async fn clear_all(&self) {
        *self.state.write() = SessionState::default();
        self.persist(&[StoredKey::Sessions, StoredKey::Profiles, StoredKey::Active])
            .await;
    }

    async fn read_raw(&self, key: StoredKey) -> Option<String> {
        match self.backend.get(key.name()).await {
            Ok(value) => value,
            Err(e) => {
                self.report_failure("read", key, &e);
                None
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: StoredKey) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let error: SessionError = StorageError::CorruptedData {
                    message: e.to_string(),
                }
                .into();
                self.report_failure("read", key, &error);
                None
            }
        }
    }

    /// Write the current value of each key to the backend.
    ///
    /// Snapshots are taken while holding `persist_lock`, so the last write
    /// to land always reflects the latest in-memory state.
    async fn persist(&self, keys: &[StoredKey]) {
        let _guard = self.persist_lock.lock().await;

        for &key in keys {
            let result = match key {
                StoredKey::Sessions => {
                    let encoded = serde_json::to_string(&self.state.read().sessions);
                    self.write_encoded(key, encoded).await
                }
                StoredKey::Profiles => {
                    let encoded = serde_json::to_string(&self.state.read().profiles);
                    self.write_encoded(key, encoded).await
                }
                StoredKey::Active => {
                    let active = self.state.read().active.clone();
                    match active {
                        Some(id) => self.backend.set(key.name(), id.to_string()).await,
                        None => self.backend.remove(key.name()).await,
                    }
                }
            };

            if let Err(e) = result {
                self.report_failure("write", key, &e);
            }
        }
    }

    async fn write_encoded(
        &self,
        key: StoredKey,
        encoded: Result<String, serde_json::Error>,
    ) -> Result<(), SessionError> {
        let value = encoded.map_err(|e| StorageError::WriteFailed {
            message: e.to_string(),
        })?;
        self.backend.set(key.name(), value).await
    }

    fn report_failure(&self, operation: &str, key: StoredKey, error: &SessionError) {
        warn!(
            operation,
            key = key.name(),
            error = %error,
            "Session storage failure ignored"
        );
        self.metrics.record_storage_failure(operation);
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SessionStore")
            .field("accounts", &state.sessions.len())
            .field("active", &state.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorageBackend;
    use crate::telemetry::{InMemoryMetrics, SessionMetricNames};
    use crate::types::Role;

    fn profile(id: &str, role: Role) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            name: format!("User {}", id),
            email: format!("{}@hospital.test", id),
            role,
            phone: None,
            avatar: None,
            synced_at: None,
            extra: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_set_session_marks_user_active() {
        let store = SessionStore::in_memory();
        let alice = UserId::new("alice");

        store
            .set_session(&alice, Some(SessionRecord::new("a1", "r1")))
            .await;

        assert_eq!(store.active_user_id(), Some(alice.clone()));
        assert_eq!(
            store.get_active_session(),
            Some(SessionRecord::new("a1", "r1"))
        );

        store.set_session(&alice, None).await;
        assert_eq!(store.get_active_session(), None);
        assert_eq!(store.get_session(&alice), None);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_user() {
        let store = SessionStore::in_memory();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .set_session(&bob, Some(SessionRecord::new("b1", "rb")))
            .await;
        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;
        store.set_session(&alice, None).await;

        assert_eq!(store.get_session(&bob), Some(SessionRecord::new("b1", "rb")));
        assert_eq!(store.active_user_id(), Some(alice));
    }

    #[tokio::test]
    async fn test_clear_session_keeps_active_pointer() {
        let store = SessionStore::in_memory();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .set_session(&bob, Some(SessionRecord::new("b1", "rb")))
            .await;
        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;

        store.clear_session(&bob).await;
        assert_eq!(store.active_user_id(), Some(alice.clone()));
        assert_eq!(store.get_session(&bob), None);

        // Clearing the active user's record leaves a dangling pointer.
        store.clear_session(&alice).await;
        assert_eq!(store.active_user_id(), Some(alice));
        assert_eq!(store.get_active_session(), None);
    }

    #[tokio::test]
    async fn test_replace_tokens_does_not_move_pointer() {
        let store = SessionStore::in_memory();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .set_session(&bob, Some(SessionRecord::new("b1", "rb")))
            .await;
        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;
        assert!(
            store
                .replace_tokens_if(&bob, "rb", SessionRecord::new("b2", "rb2"))
                .await
        );

        assert_eq!(store.active_user_id(), Some(alice));
        assert_eq!(store.get_session(&bob).unwrap().access_token, "b2");
    }

    #[tokio::test]
    async fn test_replace_tokens_skips_cleared_or_rotated_session() {
        let backend = Arc::new(MockStorageBackend::new());
        let store = SessionStore::load(backend.clone()).await;
        let alice = UserId::new("alice");

        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;
        store.set_session(&alice, None).await;
        let writes = backend.get_set_history().len();

        assert!(
            !store
                .replace_tokens_if(&alice, "ra", SessionRecord::new("a2", "ra2"))
                .await
        );
        assert_eq!(store.get_active_session(), None);
        assert_eq!(backend.get_set_history().len(), writes);

        store
            .set_session(&alice, Some(SessionRecord::new("a3", "ra3")))
            .await;
        assert!(
            !store
                .replace_tokens_if(&alice, "ra", SessionRecord::new("a2", "ra2"))
                .await
        );
        assert_eq!(store.get_active_session(), Some(SessionRecord::new("a3", "ra3")));
    }

    #[tokio::test]
    async fn test_round_trip_through_backend() {
        let backend = Arc::new(MockStorageBackend::new());
        let store = SessionStore::load(backend.clone()).await;
        let alice = UserId::new("alice");

        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;
        store
            .set_profile(&alice, profile("alice", Role::Patient))
            .await;

        assert_eq!(backend.raw(ACTIVE_USER_KEY), Some("alice".to_string()));
        let raw_sessions = backend.raw(SESSION_TOKENS_KEY).unwrap();
        assert!(raw_sessions.contains("\"accessToken\":\"a1\""));

        let reloaded = SessionStore::load(backend).await;
        assert_eq!(reloaded.get_active_session(), Some(SessionRecord::new("a1", "ra")));
        assert_eq!(reloaded.get_active_profile().unwrap().role, Role::Patient);
    }

    #[tokio::test]
    async fn test_write_failures_are_swallowed() {
        let backend = Arc::new(MockStorageBackend::new());
        backend.set_fail_writes(true);
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = SessionStore::load_with_metrics(backend.clone(), metrics.clone()).await;
        let alice = UserId::new("alice");

        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;

        // In-memory flow unaffected.
        assert_eq!(store.get_active_session().unwrap().access_token, "a1");
        assert!(metrics.total(SessionMetricNames::STORAGE_FAILURES_TOTAL) >= 2.0);
        assert!(backend.raw(SESSION_TOKENS_KEY).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_or_unreadable_storage_degrades_to_no_session() {
        let backend = Arc::new(MockStorageBackend::new());
        backend
            .insert_raw(SESSION_TOKENS_KEY, "{broken")
            .insert_raw(ACTIVE_USER_KEY, "alice");

        let store = SessionStore::load(backend.clone()).await;
        assert_eq!(store.get_active_session(), None);
        assert_eq!(store.active_user_id(), Some(UserId::new("alice")));

        backend.set_fail_reads(true);
        let store = SessionStore::load(backend).await;
        assert_eq!(store.active_user_id(), None);
        assert!(store.list_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_switch_accounts() {
        let store = SessionStore::in_memory();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .set_session(&bob, Some(SessionRecord::new("b1", "rb")))
            .await;
        store.set_profile(&bob, profile("bob", Role::Doctor)).await;
        store
            .set_session(&alice, Some(SessionRecord::new("a1", "ra")))
            .await;

        let accounts = store.list_accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].user_id, alice);
        assert!(accounts[0].is_active);
        assert_eq!(accounts[1].profile.as_ref().unwrap().role, Role::Doctor);

        store.switch_active_user(&bob).await.unwrap();
        assert_eq!(store.get_active_session().unwrap().access_token, "b1");

        let unknown = store.switch_active_user(&UserId::new("carol")).await;
        assert!(matches!(
            unknown,
            Err(SessionError::Storage(StorageError::UnknownUser { .. }))
        ));
        assert_eq!(store.active_user_id(), Some(bob));
    }

    #[tokio::test]
    async fn test_clear_all_removes_pointer_from_backend() {
        let backend = Arc::new(MockStorageBackend::new());
        let store = SessionStore::load(backend.clone()).await;
        store
            .set_session(&UserId::new("alice"), Some(SessionRecord::new("a", "r")))
            .await;

        store.clear_all().await;
        assert_eq!(store.active_user_id(), None);
        assert!(backend.raw(ACTIVE_USER_KEY).is_none());
        assert!(backend
            .get_remove_history()
            .contains(&ACTIVE_USER_KEY.to_string()));
    }
}
