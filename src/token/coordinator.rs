//! Refresh Coordinator
//!
//! Single-flight token refresh for requests that came back 401.
//!
//! The first caller to find the coordinator idle becomes the leader and
//! performs the refresh; everyone arriving while it is in flight gets a
//! one-shot receiver and waits. When the refresh settles the waiters are
//! answered in arrival order with the same outcome, and the coordinator is
//! idle again.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{AuthError, NetworkError, SessionResult, TokenError};
use crate::storage::SessionStore;
use crate::telemetry::{NoOpMetrics, SessionMetrics};
use crate::token::TokenRefresher;
use crate::types::UserId;

type Waiter = oneshot::Sender<SessionResult<String>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

/// Counters describing coordinator activity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub refreshes_started: u64,
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub requests_queued: u64,
}

/// Why a refresh is being requested.
#[derive(Clone, Copy, Debug)]
enum Trigger<'a> {
    /// A request carrying `sent_with` (or no token) was answered 401.
    Unauthorized { sent_with: Option<&'a str> },
    /// The caller asked for a refresh outright.
    Explicit,
}

enum Role {
    Leader {
        user_id: UserId,
        refresh_token: String,
    },
    Follower(oneshot::Receiver<SessionResult<String>>),
    Done(SessionResult<String>),
}

/// Coordinates token refreshes for one session store.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    stats: Mutex<RefreshStats>,
    store: Arc<SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_timeout: Option<Duration>,
    metrics: Arc<dyn SessionMetrics>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<SessionStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            stats: Mutex::new(RefreshStats::default()),
            store,
            refresher,
            refresh_timeout: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Fail a refresh that has not settled within `timeout`.
    pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Obtain an access token to replay a request that was answered 401.
    ///
    /// `sent_with` is the access token the failed request carried. If the
    /// active session already holds a different token, that token is
    /// returned without a refresh.
    ///
    /// Errors with [`TokenError::NoRefreshToken`] or
    /// [`AuthError::NotAuthenticated`] when no refresh is possible; the
    /// caller should then surface its original 401.
    pub async fn handle_unauthorized(&self, sent_with: Option<&str>) -> SessionResult<String> {
        self.coordinate(Trigger::Unauthorized { sent_with }).await
    }

    /// Refresh the active session now, joining any refresh in flight.
    pub async fn refresh_active(&self) -> SessionResult<String> {
        self.coordinate(Trigger::Explicit).await
    }

    /// Whether a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of callers waiting on the in-flight refresh.
    pub fn pending(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats.lock().clone()
    }

    async fn coordinate(&self, trigger: Trigger<'_>) -> SessionResult<String> {
        match self.enter(trigger) {
            Role::Done(result) => result,
            Role::Follower(receiver) => {
                debug!("Request queued behind in-flight token refresh");
                self.metrics.record_request_queued();
                receiver
                    .await
                    .unwrap_or(Err(TokenError::RefreshCancelled.into()))
            }
            Role::Leader {
                user_id,
                refresh_token,
            } => {
                let mut guard = SettleGuard {
                    coordinator: self,
                    settled: false,
                };
                let result = self.run_refresh(&user_id, &refresh_token).await;
                guard.settle(result.clone());
                result
            }
        }
    }

    /// Decide this caller's role. The idle check and the transition to
    /// refreshing happen under one lock acquisition.
    fn enter(&self, trigger: Trigger<'_>) -> Role {
        let mut state = self.state.lock();

        if let RefreshState::Refreshing { waiters } = &mut *state {
            let (sender, receiver) = oneshot::channel();
            waiters.push(sender);
            self.stats.lock().requests_queued += 1;
            return Role::Follower(receiver);
        }

        let Some((user_id, session)) = self.store.active_entry() else {
            return Role::Done(Err(AuthError::NotAuthenticated.into()));
        };

        if let Trigger::Unauthorized { sent_with } = trigger {
            if sent_with != Some(session.access_token.as_str()) {
                debug!(user = %user_id, "Replaying with newer access token, refresh skipped");
                return Role::Done(Ok(session.access_token));
            }
        }

        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            return Role::Done(Err(TokenError::NoRefreshToken.into()));
        };

        *state = RefreshState::Refreshing {
            waiters: Vec::new(),
        };
        self.stats.lock().refreshes_started += 1;

        Role::Leader {
            user_id,
            refresh_token,
        }
    }

    async fn run_refresh(&self, user_id: &UserId, refresh_token: &str) -> SessionResult<String> {
        info!(user = %user_id, "Refreshing session tokens");

        let call = self.refresher.refresh(refresh_token);
        let response = match self.refresh_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Timeout { timeout }.into()),
            },
            None => call.await,
        }?;

        let record = response.into_record(Some(refresh_token));
        let access_token = record.access_token.clone();
        if !self
            .store
            .replace_tokens_if(user_id, refresh_token, record)
            .await
        {
            // Signed out (or signed in again) while the refresh was in flight.
            info!(user = %user_id, "Session changed during refresh, new tokens discarded");
            return Err(AuthError::NotAuthenticated.into());
        }

        Ok(access_token)
    }

    /// Return to idle and answer every waiter, oldest first.
    fn settle(&self, result: SessionResult<String>) {
        let waiters = match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };

        {
            let mut stats = self.stats.lock();
            if result.is_ok() {
                stats.refreshes_succeeded += 1;
            } else {
                stats.refreshes_failed += 1;
            }
        }
        self.metrics.record_token_refresh(result.is_ok());

        match &result {
            Ok(_) => debug!(waiters = waiters.len(), "Token refresh succeeded"),
            Err(e) => warn!(waiters = waiters.len(), error = %e, "Token refresh failed"),
        }

        for waiter in waiters {
            // A dropped receiver means that caller gave up; nothing to do.
            let _ = waiter.send(result.clone());
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("pending", &self.pending())
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}

/// Settles the coordinator if the leader's future is dropped mid-refresh.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, result: SessionResult<String>) {
        self.settled = true;
        self.coordinator.settle(result);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(Err(TokenError::RefreshCancelled.into()));
        }
    }
}
