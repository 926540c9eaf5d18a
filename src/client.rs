//! API Client
//!
//! Request pipeline for the hospital backend: bearer interception, transport,
//! 401 recovery through the refresh coordinator, and status mapping.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::{
    create_transport, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestHttpTransport,
};
use crate::error::{
    create_error_from_response, AuthError, NetworkError, ProtocolError, SessionError,
    SessionResult, TokenError,
};
use crate::services::AuthService;
use crate::storage::{create_storage_backend, SessionStore};
use crate::telemetry::{log_request, log_response, NoOpMetrics, SessionMetrics};
use crate::token::{
    BearerInterceptor, HttpTokenRefresher, RefreshCoordinator, RefreshStats, RequestInterceptor,
    TokenRefresher,
};
use crate::types::ClientConfig;

/// A request relative to `{base_url}/api`.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path under the API prefix, e.g. `/appointments`.
    pub path: String,
    pub body: Option<Value>,
    pub headers: HashMap<String, String>,
    /// Set once the request has been replayed after a 401.
    pub retried: bool,
    /// Skip the bearer credential and 401 recovery.
    pub public: bool,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HashMap::new(),
            retried: false,
            public: false,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Send without the session credential (login, registration, OTP).
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Session-aware client for the hospital API.
pub struct ApiClient<T: HttpTransport = ReqwestHttpTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    store: Arc<SessionStore>,
    interceptor: BearerInterceptor,
    coordinator: Arc<RefreshCoordinator>,
    metrics: Arc<dyn SessionMetrics>,
}

impl ApiClient<ReqwestHttpTransport> {
    /// Create a client over reqwest, loading sessions from
    /// `config.storage_path` when set.
    pub async fn new(config: ClientConfig) -> SessionResult<Self> {
        Self::with_metrics(config, Arc::new(NoOpMetrics)).await
    }

    pub async fn with_metrics(
        config: ClientConfig,
        metrics: Arc<dyn SessionMetrics>,
    ) -> SessionResult<Self> {
        config.validate()?;

        let transport = Arc::new(create_transport(
            Some(config.timeout),
            Some(config.user_agent.as_str()),
        )?);
        let backend = create_storage_backend(config.storage_path.as_deref());
        let store = Arc::new(SessionStore::load_with_metrics(backend, metrics.clone()).await);
        let refresher = Arc::new(HttpTokenRefresher::new(&config, transport.clone()));

        Ok(Self::from_parts(config, transport, store, refresher, metrics))
    }
}

impl<T: HttpTransport + 'static> ApiClient<T> {
    /// Client over `transport` with an in-memory session store.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let transport = Arc::new(transport);
        let refresher = Arc::new(HttpTokenRefresher::new(&config, transport.clone()));
        Self::from_parts(
            config,
            transport,
            Arc::new(SessionStore::in_memory()),
            refresher,
            Arc::new(NoOpMetrics),
        )
    }
}

impl<T: HttpTransport> ApiClient<T> {
    /// Assemble a client from its components.
    pub fn from_parts(
        config: ClientConfig,
        transport: Arc<T>,
        store: Arc<SessionStore>,
        refresher: Arc<dyn TokenRefresher>,
        metrics: Arc<dyn SessionMetrics>,
    ) -> Self {
        let coordinator = Arc::new(
            RefreshCoordinator::new(store.clone(), refresher)
                .with_refresh_timeout(config.refresh_timeout)
                .with_metrics(metrics.clone()),
        );

        Self {
            interceptor: BearerInterceptor::new(store.clone()),
            config,
            transport,
            store,
            coordinator,
            metrics,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn refresh_stats(&self) -> RefreshStats {
        self.coordinator.stats()
    }

    /// Authentication endpoints bound to this client's session store.
    pub fn auth(&self) -> AuthService<'_, T> {
        AuthService::new(self)
    }

    /// Send a request through the pipeline.
    ///
    /// A 401 on an authenticated request that has not been retried yet goes
    /// to the refresh coordinator and the request is replayed once with the
    /// token it hands back. Any other non-2xx status is an error.
    pub async fn send(&self, mut request: ApiRequest) -> SessionResult<HttpResponse> {
        let mut replay_token: Option<String> = None;

        loop {
            let mut http = self.build_http_request(&request);
            let sent_with = match (&replay_token, request.public) {
                (_, true) => None,
                (Some(token), false) => {
                    http.headers
                        .insert("authorization".to_string(), format!("Bearer {}", token));
                    Some(token.clone())
                }
                (None, false) => self.interceptor.intercept(&mut http),
            };

            log_request(request.method.as_str(), &http.url, sent_with.is_some());
            let started = Instant::now();
            let response = self
                .transport
                .send(http)
                .await
                .map_err(|e| self.fail(e))?;
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            log_response(response.status, elapsed);
            self.metrics
                .record_request_duration(&request.path, elapsed as f64);

            if response.is_success() {
                return Ok(response);
            }

            if response.is_unauthorized() && !request.public && !request.retried {
                match self
                    .coordinator
                    .handle_unauthorized(sent_with.as_deref())
                    .await
                {
                    Ok(token) => {
                        debug!(path = %request.path, "Replaying request after 401");
                        self.metrics.record_request_replayed();
                        request.retried = true;
                        replay_token = Some(token);
                        continue;
                    }
                    // Nothing to refresh with; the caller sees the original 401.
                    Err(SessionError::Token(TokenError::NoRefreshToken))
                    | Err(SessionError::Auth(AuthError::NotAuthenticated)) => {}
                    Err(e) => return Err(self.fail(e)),
                }
            }

            return Err(self.fail(create_error_from_response(
                response.status,
                &response.body,
            )));
        }
    }

    /// `GET` and decode the JSON body.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> SessionResult<R> {
        let response = self.send(ApiRequest::get(path)).await?;
        self.decode(&response)
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<R> {
        let response = self
            .send(ApiRequest::post(path, Self::encode(body)?))
            .await?;
        self.decode(&response)
    }

    /// `PUT` a JSON body and decode the JSON response.
    pub async fn put_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<R> {
        let response = self.send(ApiRequest::put(path, Self::encode(body)?)).await?;
        self.decode(&response)
    }

    /// `PATCH` a JSON body and decode the JSON response.
    pub async fn patch_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<R> {
        let response = self
            .send(ApiRequest::patch(path, Self::encode(body)?))
            .await?;
        self.decode(&response)
    }

    /// `DELETE`, discarding the response body.
    pub async fn delete(&self, path: &str) -> SessionResult<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    fn build_http_request(&self, request: &ApiRequest) -> HttpRequest {
        let mut http = HttpRequest::new(request.method, self.config.endpoint(&request.path))
            .with_header("accept", "application/json");
        if let Some(body) = &request.body {
            http = http.with_json(body);
        }
        for (name, value) in &request.headers {
            http.headers.insert(name.clone(), value.clone());
        }
        http.timeout = Some(request.timeout.unwrap_or(self.config.timeout));
        http
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> SessionResult<Value> {
        serde_json::to_value(body).map_err(|e| {
            NetworkError::InvalidRequest {
                message: format!("unserializable body: {}", e),
            }
            .into()
        })
    }

    pub(crate) fn decode<R: DeserializeOwned>(
        &self,
        response: &HttpResponse,
    ) -> SessionResult<R> {
        // Empty 2xx bodies decode as JSON null.
        let body = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| {
            self.fail(
                ProtocolError::InvalidResponse {
                    message: e.to_string(),
                }
                .into(),
            )
        })
    }

    fn fail(&self, error: SessionError) -> SessionError {
        self.metrics.record_error(error.error_code());
        error
    }
}

impl<T: HttpTransport> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("active_user", &self.store.active_user_id())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Create an API client from configuration.
pub async fn api_client(config: ClientConfig) -> SessionResult<ApiClient> {
    ApiClient::new(config).await
}
