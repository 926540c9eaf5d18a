//! Token Refresher
//!
//! Performs the `/auth/refresh` network call. The call goes straight to the
//! transport so a failing refresh can never re-enter the 401 handling of the
//! request pipeline.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{extract_error_message, SessionError, TokenError};
use crate::types::{ClientConfig, TokenPairResponse};

/// Token refresher interface.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, SessionError>;
}

/// Refresher calling `POST {base}/api/auth/refresh`.
pub struct HttpTokenRefresher<T: HttpTransport> {
    transport: Arc<T>,
    endpoint: String,
    timeout: Duration,
}

impl<T: HttpTransport> HttpTokenRefresher<T> {
    pub fn new(config: &ClientConfig, transport: Arc<T>) -> Self {
        Self {
            transport,
            endpoint: config.endpoint("/auth/refresh"),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenRefresher for HttpTokenRefresher<T> {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, SessionError> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.endpoint.clone())
            .with_json(&serde_json::json!({ "refreshToken": refresh_token }))
            .with_header("accept", "application/json");
        request.timeout = Some(self.timeout);

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(TokenError::RefreshFailed {
                status: Some(response.status),
                message: extract_error_message(response.status, &response.body),
            }
            .into());
        }

        response.json_body::<TokenPairResponse>().map_err(|e| {
            TokenError::RefreshFailed {
                status: Some(response.status),
                message: format!("unreadable refresh response: {}", e),
            }
            .into()
        })
    }
}

/// Mock token refresher for testing.
///
/// Returns queued outcomes in order, then a generated pair. `hold` parks
/// every call until `release` so tests can pile requests up behind an
/// in-flight refresh.
#[derive(Default)]
pub struct MockTokenRefresher {
    outcomes: Mutex<VecDeque<Result<TokenPairResponse, SessionError>>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockTokenRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful refresh.
    pub fn queue_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> &Self {
        self.outcomes.lock().push_back(Ok(TokenPairResponse {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        }));
        self
    }

    /// Queue a failed refresh.
    pub fn queue_error(&self, error: SessionError) -> &Self {
        self.outcomes.lock().push_back(Err(error));
        self
    }

    /// Park subsequent calls until [`release`](Self::release).
    pub fn hold(&self) -> &Self {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let parked and future calls proceed.
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Refresh tokens passed to each call, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPairResponse, SessionError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(refresh_token.to_string());
            calls.len()
        };

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Permits are never returned; a closed gate only means released.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let queued = self.outcomes.lock().pop_front();
        queued.unwrap_or_else(|| {
            Ok(TokenPairResponse {
                access_token: format!("refreshed-access-{}", call_number),
                refresh_token: Some(format!("refreshed-refresh-{}", call_number)),
            })
        })
    }
}
