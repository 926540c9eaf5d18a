//! Integration tests for file-backed sessions

use super::*;
use hms_session_integration::session_config;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn file_config(server: &MockServer, dir: &TempDir) -> ClientConfig {
    session_config()
        .base_url(server.uri())
        .storage_path(dir.path().join("sessions.json"))
        .build()
        .expect("valid test config")
}

#[tokio::test]
async fn test_sessions_survive_restart() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(json_response(
            200,
            json!({
                "accessToken": "access-1",
                "refreshToken": "refresh-1",
                "user": profile_json("patient-1", "patient")
            }),
        ))
        .mount(&server)
        .await;

    {
        let client = ApiClient::new(file_config(&server, &dir)).await.unwrap();
        client
            .auth()
            .login(&hms_session_integration::LoginCredentials::new("p@hospital.test", "pw"))
            .await
            .unwrap();
    }

    let restarted = ApiClient::new(file_config(&server, &dir)).await.unwrap();
    assert_eq!(
        restarted.store().active_user_id(),
        Some(UserId::new("patient-1"))
    );
    assert_eq!(
        restarted.store().get_active_session(),
        Some(SessionRecord::new("access-1", "refresh-1"))
    );
    assert_eq!(
        restarted.store().get_active_profile().unwrap().email,
        "patient-1@hospital.test"
    );
}

#[tokio::test]
async fn test_refreshed_pair_is_written_through() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    with_bearer("GET", "/api/notifications", "old-access")
        .respond_with(expired_token_response())
        .mount(&server)
        .await;
    with_bearer("GET", "/api/notifications", "new-access")
        .respond_with(json_response(200, json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(json_response(200, json!({"accessToken": "new-access"})))
        .expect(1)
        .mount(&server)
        .await;

    {
        let client = ApiClient::new(file_config(&server, &dir)).await.unwrap();
        client
            .store()
            .set_session(
                &UserId::new("patient-1"),
                Some(SessionRecord::new("old-access", "refresh-1")),
            )
            .await;
        let _: Value = client.get_json("/notifications").await.unwrap();
    }

    let raw = std::fs::read_to_string(dir.path().join("sessions.json")).unwrap();
    let stored: Value = serde_json::from_str(&raw).unwrap();
    let sessions: Value = serde_json::from_str(stored["session_tokens"].as_str().unwrap()).unwrap();
    assert_eq!(
        sessions["patient-1"],
        json!({"accessToken": "new-access", "refreshToken": "refresh-1"})
    );
}
