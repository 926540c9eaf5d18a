//! Integration tests for the auth endpoints

use super::*;
use hms_session_integration::{AuthError, LoginCredentials, Role, SessionError};
use pretty_assertions::assert_eq;
use wiremock::matchers::body_partial_json;

async fn anonymous_client(server: &MockServer) -> ApiClient {
    ApiClient::new(config_for(server)).await.expect("client builds")
}

#[tokio::test]
async fn test_login_then_authenticated_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({"email": "asha@hospital.test", "role": "doctor"})))
        .respond_with(json_response(
            200,
            json!({
                "accessToken": "access-1",
                "refreshToken": "refresh-1",
                "user": profile_json("doctor-1", "doctor")
            }),
        ))
        .expect(1)
        .mount(&server)
        .await;
    with_bearer("GET", "/api/doctors/schedule", "access-1")
        .respond_with(json_response(200, json!({"slots": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server).await;
    let profile = client
        .auth()
        .login(&LoginCredentials::new("asha@hospital.test", "pw").with_role(Role::Doctor))
        .await
        .unwrap();

    assert_eq!(profile.id, UserId::new("doctor-1"));
    assert_eq!(client.store().active_user_id(), Some(UserId::new("doctor-1")));

    let schedule: Value = client.get_json("/doctors/schedule").await.unwrap();
    assert_eq!(schedule, json!({"slots": []}));
}

#[tokio::test]
async fn test_login_failure_reports_backend_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(json_response(400, json!({"message": "Invalid credentials"})))
        .mount(&server)
        .await;

    let client = anonymous_client(&server).await;
    let err = client
        .auth()
        .login(&LoginCredentials::new("x@hospital.test", "wrong"))
        .await
        .unwrap_err();

    match err {
        SessionError::Auth(AuthError::LoginFailed { message }) => {
            assert_eq!(message, "Invalid credentials")
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(client.store().list_accounts().is_empty());
}

#[tokio::test]
async fn test_logout_clears_session_when_backend_is_down() {
    let server = MockServer::start().await;

    with_bearer("POST", "/api/auth/logout", "access-1")
        .respond_with(json_response(503, json!({"message": "Service unavailable"})))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::new("access-1", "refresh-1")).await;
    client.auth().logout().await.unwrap();

    assert!(client.store().get_active_session().is_none());
    assert!(client.store().get_session(&UserId::new("patient-1")).is_none());
}

#[tokio::test]
async fn test_accounts_are_isolated_and_switchable() {
    let server = MockServer::start().await;

    with_bearer("GET", "/api/auth/me", "patient-access")
        .respond_with(json_response(200, json!({ "user": profile_json("patient-1", "patient") })))
        .mount(&server)
        .await;
    with_bearer("GET", "/api/auth/me", "admin-access")
        .respond_with(json_response(200, profile_json("admin-1", "admin")))
        .mount(&server)
        .await;

    let client =
        signed_in_client(&server, "patient-1", SessionRecord::new("patient-access", "pr")).await;
    client
        .store()
        .set_session(&UserId::new("admin-1"), Some(SessionRecord::new("admin-access", "ar")))
        .await;

    assert_eq!(client.auth().me().await.unwrap().role, Role::Admin);

    client
        .auth()
        .switch_account(&UserId::new("patient-1"))
        .await
        .unwrap();
    assert_eq!(client.auth().me().await.unwrap().role, Role::Patient);

    let accounts = client.store().list_accounts();
    assert_eq!(accounts.len(), 2);
    assert_eq!(
        accounts.iter().filter(|a| a.is_active).count(),
        1,
        "exactly one account is active"
    );
    assert_eq!(
        client.store().get_session(&UserId::new("admin-1")),
        Some(SessionRecord::new("admin-access", "ar"))
    );
}
