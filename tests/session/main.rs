//! Integration tests using WireMock
//!
//! These run the full request pipeline against a mock hospital backend:
//! bearer attachment, 401 recovery, refresh coordination and persistence.

mod auth;
mod persistence;
mod refresh;

use hms_session_integration::{session_config, ApiClient, ClientConfig, SessionRecord, UserId};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

/// Configuration pointing at the mock server.
pub fn config_for(server: &MockServer) -> ClientConfig {
    session_config()
        .base_url(server.uri())
        .build()
        .expect("valid test config")
}

/// Client with an in-memory store, signed in as `user` with the given pair.
pub async fn signed_in_client(server: &MockServer, user: &str, record: SessionRecord) -> ApiClient {
    let client = ApiClient::new(config_for(server))
        .await
        .expect("client builds");
    client
        .store()
        .set_session(&UserId::new(user), Some(record))
        .await;
    client
}

/// Mock for `method path` that only matches the given bearer token.
pub fn with_bearer(http_method: &str, api_path: &str, token: &str) -> MockBuilder {
    Mock::given(method(http_method))
        .and(path(api_path))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
}

pub fn json_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

pub fn expired_token_response() -> ResponseTemplate {
    json_response(401, json!({"message": "jwt expired"}))
}

pub fn profile_json(id: &str, role: &str) -> Value {
    json!({
        "_id": id,
        "name": "Test User",
        "email": format!("{}@hospital.test", id),
        "role": role
    })
}
