//! Request Interceptor
//!
//! Attaches the active session's bearer credential to outgoing requests.

use std::sync::Arc;

use crate::core::HttpRequest;
use crate::storage::SessionStore;

/// Request interceptor interface.
pub trait RequestInterceptor: Send + Sync {
    /// Decorate `request` before it is sent. Returns the access token that
    /// was attached, if any.
    fn intercept(&self, request: &mut HttpRequest) -> Option<String>;
}

/// Attaches `Authorization: Bearer <accessToken>` from the active session.
///
/// Without an active session the request goes out unchanged.
pub struct BearerInterceptor {
    store: Arc<SessionStore>,
}

impl BearerInterceptor {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

impl RequestInterceptor for BearerInterceptor {
    fn intercept(&self, request: &mut HttpRequest) -> Option<String> {
        let session = self.store.get_active_session()?;
        if session.access_token.is_empty() {
            return None;
        }
        request
            .headers
            .insert("authorization".to_string(), session.authorization_header());
        Some(session.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HttpMethod;
    use crate::types::{SessionRecord, UserId};

    #[tokio::test]
    async fn test_attaches_active_bearer() {
        let store = Arc::new(SessionStore::in_memory());
        store
            .set_session(&UserId::new("u1"), Some(SessionRecord::new("tok", "ref")))
            .await;
        let interceptor = BearerInterceptor::new(store);

        let mut request = HttpRequest::new(HttpMethod::Get, "http://h/api/appointments")
            .with_header("Authorization", "Bearer caller-supplied");
        let attached = interceptor.intercept(&mut request);

        assert_eq!(attached.as_deref(), Some("tok"));
        assert_eq!(request.header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_no_session_sends_unauthenticated() {
        let interceptor = BearerInterceptor::new(Arc::new(SessionStore::in_memory()));
        let mut request = HttpRequest::new(HttpMethod::Get, "http://h/api/doctors");

        assert!(interceptor.intercept(&mut request).is_none());
        assert!(request.header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_follows_active_pointer() {
        let store = Arc::new(SessionStore::in_memory());
        let interceptor = BearerInterceptor::new(store.clone());

        store
            .set_session(&UserId::new("a"), Some(SessionRecord::new("ta", "ra")))
            .await;
        store
            .set_session(&UserId::new("b"), Some(SessionRecord::new("tb", "rb")))
            .await;

        let mut request = HttpRequest::new(HttpMethod::Get, "http://h/api/me");
        assert_eq!(interceptor.intercept(&mut request).as_deref(), Some("tb"));

        store.switch_active_user(&UserId::new("a")).await.unwrap();
        let mut request = HttpRequest::new(HttpMethod::Get, "http://h/api/me");
        assert_eq!(interceptor.intercept(&mut request).as_deref(), Some("ta"));
    }
}
