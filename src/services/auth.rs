//! Auth Service
//!
//! Login, registration, logout and account switching. Every successful
//! sign-in lands in the session store as the active account.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::client::{ApiClient, ApiRequest};
use crate::core::HttpTransport;
use crate::error::{ApiError, AuthError, SessionError, SessionResult};
use crate::types::auth::MeResponse;
use crate::types::{
    LoginCredentials, LoginResponse, MessageResponse, RegisterRequest, RegisterResponse,
    ResetPasswordRequest, SessionRecord, UserId, UserProfile,
};

/// Auth endpoints under `/api/auth`.
pub struct AuthService<'a, T: HttpTransport> {
    client: &'a ApiClient<T>,
}

impl<'a, T: HttpTransport> AuthService<'a, T> {
    pub fn new(client: &'a ApiClient<T>) -> Self {
        Self { client }
    }

    /// Sign in and make the account active.
    ///
    /// Rejections carry the backend's message as [`AuthError::LoginFailed`].
    pub async fn login(&self, credentials: &LoginCredentials) -> SessionResult<UserProfile> {
        let response = self
            .client
            .send(ApiRequest::post("/auth/login", credentials.to_body()).public())
            .await
            .map_err(|e| match rejection_message(e) {
                Ok(message) => AuthError::LoginFailed { message }.into(),
                Err(other) => other,
            })?;

        let login: LoginResponse = self.client.decode(&response)?;
        let profile = self.remember(login.session(), login.user).await;

        info!(user = %profile.id, role = profile.role.as_str(), "Signed in");
        Ok(profile)
    }

    /// Create an account. When the backend signs the user in right away the
    /// session is stored and made active.
    pub async fn register(&self, request: &RegisterRequest) -> SessionResult<RegisterResponse> {
        let response = self
            .client
            .send(ApiRequest::post("/auth/register", request.to_body()).public())
            .await
            .map_err(|e| match rejection_message(e) {
                Ok(message) => AuthError::RegistrationFailed { message }.into(),
                Err(other) => other,
            })?;

        let mut registered: RegisterResponse = self.client.decode(&response)?;
        if let (Some(session), Some(user)) = (registered.session(), registered.user.take()) {
            let profile = self.remember(session, user).await;
            info!(user = %profile.id, "Registered and signed in");
            registered.user = Some(profile);
        }
        Ok(registered)
    }

    /// Refresh the active session's tokens, sharing any refresh in flight.
    pub async fn refresh(&self) -> SessionResult<String> {
        self.client.coordinator().refresh_active().await
    }

    /// Sign the active account out.
    ///
    /// The local session is cleared even when the backend call fails.
    pub async fn logout(&self) -> SessionResult<()> {
        let store = self.client.store();
        let Some(user_id) = store.active_user_id() else {
            return Ok(());
        };

        if let Some(session) = store.get_session(&user_id) {
            let body = json!({ "refreshToken": session.refresh_token() });
            if let Err(e) = self.client.send(ApiRequest::post("/auth/logout", body)).await {
                warn!(user = %user_id, error = %e, "Logout request failed, clearing local session");
            }
        }

        store.set_session(&user_id, None).await;
        info!(user = %user_id, "Signed out");
        Ok(())
    }

    /// Fetch the signed-in user's profile and cache it.
    pub async fn me(&self) -> SessionResult<UserProfile> {
        let response = self.client.send(ApiRequest::get("/auth/me")).await?;
        let me: MeResponse = self.client.decode(&response)?;

        let mut profile = me.into_profile();
        profile.synced_at = Some(Utc::now());
        let user_id = self
            .client
            .store()
            .active_user_id()
            .unwrap_or_else(|| profile.id.clone());
        self.client
            .store()
            .set_profile(&user_id, profile.clone())
            .await;
        Ok(profile)
    }

    /// Request a one-time code for `email`.
    pub async fn send_otp(&self, email: &str) -> SessionResult<MessageResponse> {
        self.acknowledge(ApiRequest::post("/auth/send-otp", json!({ "email": email })))
            .await
    }

    /// Start a password reset for `email`.
    pub async fn forgot_password(&self, email: &str) -> SessionResult<MessageResponse> {
        self.acknowledge(ApiRequest::post(
            "/auth/forgot-password",
            json!({ "email": email }),
        ))
        .await
    }

    /// Set a new password using a one-time code.
    pub async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
    ) -> SessionResult<MessageResponse> {
        self.acknowledge(ApiRequest::patch("/auth/reset-password", request.to_body()))
            .await
    }

    /// Make another stored account active.
    pub async fn switch_account(&self, user_id: &UserId) -> SessionResult<()> {
        self.client.store().switch_active_user(user_id).await?;
        info!(user = %user_id, "Switched active account");
        Ok(())
    }

    /// Sign out one account. The active account goes through [`logout`];
    /// a background account is revoked with its own credential and removed
    /// without moving the active pointer.
    ///
    /// [`logout`]: Self::logout
    pub async fn sign_out_account(&self, user_id: &UserId) -> SessionResult<()> {
        let store = self.client.store();
        if store.active_user_id().as_ref() == Some(user_id) {
            return self.logout().await;
        }

        let Some(session) = store.get_session(user_id) else {
            return Ok(());
        };

        let request = ApiRequest::post(
            "/auth/logout",
            json!({ "refreshToken": session.refresh_token() }),
        )
        .with_header("authorization", session.authorization_header())
        .public();
        if let Err(e) = self.client.send(request).await {
            warn!(user = %user_id, error = %e, "Background logout failed, clearing local session");
        }

        store.clear_session(user_id).await;
        info!(user = %user_id, "Signed out background account");
        Ok(())
    }

    async fn remember(
        &self,
        session: SessionRecord,
        mut profile: UserProfile,
    ) -> UserProfile {
        profile.synced_at = Some(Utc::now());
        let store = self.client.store();
        store.set_session(&profile.id, Some(session)).await;
        store.set_profile(&profile.id, profile.clone()).await;
        profile
    }

    async fn acknowledge(&self, request: ApiRequest) -> SessionResult<MessageResponse> {
        let response = self.client.send(request.public()).await?;
        let message: Option<MessageResponse> = self.client.decode(&response)?;
        Ok(message.unwrap_or_default())
    }
}

/// Backend rejection message, or the error itself when the request never
/// got a verdict.
fn rejection_message(error: SessionError) -> Result<String, SessionError> {
    match error {
        SessionError::Auth(AuthError::Unauthorized { message })
        | SessionError::Api(ApiError { message, .. }) => Ok(message),
        other => Err(other),
    }
}
