//! Integration tests for coordinated token refresh

use super::*;
use futures::future::join_all;
use hms_session_integration::{ApiError, AuthError, SessionError, TokenError};
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;
use wiremock::matchers::body_json;

async fn mount_refresh(server: &MockServer, refresh_token: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refreshToken": refresh_token })))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_parallel_expired_requests_share_one_refresh() {
    let server = setup().await;

    with_bearer("GET", "/api/appointments", "expired-a")
        .respond_with(expired_token_response())
        .expect(3)
        .mount(&server)
        .await;
    with_bearer("GET", "/api/appointments", "fresh-a")
        .respond_with(json_response(200, json!([{"id": "apt-1"}])))
        .expect(3)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        "refresh-1",
        json_response(200, json!({"accessToken": "fresh-a", "refreshToken": "refresh-2"}))
            .set_delay(Duration::from_millis(200)),
    )
    .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::new("expired-a", "refresh-1")).await;

    let results = join_all((0..3).map(|_| client.get_json::<Value>("/appointments"))).await;

    for result in results {
        assert_eq!(result.unwrap(), json!([{"id": "apt-1"}]));
    }
    assert_eq!(
        client.store().get_session(&UserId::new("patient-1")),
        Some(SessionRecord::new("fresh-a", "refresh-2"))
    );

    let stats = client.refresh_stats();
    assert_eq!(stats.refreshes_started, 1);
    assert_eq!(stats.refreshes_succeeded, 1);
    assert_eq!(client.coordinator().pending(), 0);
}

#[tokio::test]
async fn test_refresh_failure_rejects_every_waiting_request() {
    let server = setup().await;

    with_bearer("GET", "/api/records", "expired-a")
        .respond_with(expired_token_response())
        .expect(3)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        "refresh-1",
        json_response(401, json!({"message": "Refresh token expired"}))
            .set_delay(Duration::from_millis(200)),
    )
    .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::new("expired-a", "refresh-1")).await;

    let results = join_all((0..3).map(|_| client.get_json::<Value>("/records"))).await;

    for result in results {
        match result {
            Err(SessionError::Token(TokenError::RefreshFailed { status, message })) => {
                assert_eq!(status, Some(401));
                assert_eq!(message, "Refresh token expired");
            }
            other => panic!("expected refresh failure, got {:?}", other),
        }
    }
    assert_eq!(client.coordinator().pending(), 0);
    assert!(!client.coordinator().is_refreshing());
    assert_eq!(client.refresh_stats().refreshes_failed, 1);
}

#[tokio::test]
async fn test_replayed_request_is_not_refreshed_twice() {
    let server = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/prescriptions"))
        .respond_with(json_response(401, json!({"message": "Access denied"})))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh(
        &server,
        "refresh-1",
        json_response(200, json!({"accessToken": "fresh-a", "refreshToken": "refresh-2"})),
    )
    .await;

    let client =
        signed_in_client(&server, "doctor-1", SessionRecord::new("expired-a", "refresh-1")).await;

    let err = client.get_json::<Value>("/prescriptions").await.unwrap_err();
    match err {
        SessionError::Auth(AuthError::Unauthorized { message }) => {
            assert_eq!(message, "Access denied")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_without_refresh_token_is_not_refreshed() {
    let server = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(expired_token_response())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(json_response(200, json!({"accessToken": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::access_only("expired-a")).await;

    let err = client.auth().me().await.unwrap_err();
    assert!(matches!(err, SessionError::Auth(AuthError::Unauthorized { .. })));
    assert!(err.needs_reauth());
}

#[test_case(400, "Slot already booked" ; "bad request")]
#[test_case(403, "Doctors only" ; "forbidden")]
#[test_case(404, "Appointment not found" ; "not found")]
#[test_case(503, "Maintenance" ; "unavailable")]
#[tokio::test]
async fn test_non_auth_errors_are_not_refreshed(status: u16, message: &str) {
    let server = setup().await;

    with_bearer("PATCH", "/api/appointments/apt-1", "valid-a")
        .respond_with(json_response(status, json!({ "message": message })))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::new("valid-a", "refresh-1")).await;

    let err = client
        .patch_json::<_, Value>("/appointments/apt-1", &json!({"status": "cancelled"}))
        .await
        .unwrap_err();

    match err {
        SessionError::Api(ApiError { status: got, message: text }) => {
            assert_eq!(got, status);
            assert_eq!(text, message);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(client.refresh_stats().refreshes_started, 0);
}

async fn setup() -> MockServer {
    MockServer::start().await
}
