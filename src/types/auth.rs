//! Auth Endpoint Types
//!
//! Request and response bodies for the `/auth/*` endpoints.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Role, SessionRecord, UserProfile};

/// Email/password credentials for `POST /auth/login`.
#[derive(Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: SecretString,
    /// Role the user is signing in as, when the login form asks for one.
    pub role: Option<Role>,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
            role: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// JSON request body. The password is exposed only here.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "email": self.email,
            "password": self.password.expose_secret(),
        });
        if let Some(role) = self.role {
            body["role"] = json!(role);
        }
        body
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// Body for `POST /auth/register`.
#[derive(Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: SecretString,
    pub role: Role,
    pub phone: Option<String>,
    /// One-time code previously requested through `/auth/send-otp`.
    pub otp: Option<String>,
}

impl RegisterRequest {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: SecretString::new(password.into()),
            role,
            phone: None,
            otp: None,
        }
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "email": self.email,
            "password": self.password.expose_secret(),
            "role": self.role,
        });
        if let Some(phone) = &self.phone {
            body["phone"] = json!(phone);
        }
        if let Some(otp) = &self.otp {
            body["otp"] = json!(otp);
        }
        body
    }
}

/// Body for `PATCH /auth/reset-password`.
#[derive(Clone)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: SecretString,
}

impl ResetPasswordRequest {
    pub fn new(
        email: impl Into<String>,
        otp: impl Into<String>,
        new_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            otp: otp.into(),
            new_password: SecretString::new(new_password.into()),
        }
    }

    pub fn to_body(&self) -> Value {
        json!({
            "email": self.email,
            "otp": self.otp,
            "newPassword": self.new_password.expose_secret(),
        })
    }
}

/// Response of `POST /auth/login`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserProfile,
}

impl LoginResponse {
    pub fn session(&self) -> SessionRecord {
        SessionRecord {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Response of `POST /auth/register`.
///
/// Some deployments sign the user in immediately, others only confirm.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RegisterResponse {
    /// Session to store, when the backend signed the user in.
    pub fn session(&self) -> Option<SessionRecord> {
        self.access_token.as_ref().map(|access| SessionRecord {
            access_token: access.clone(),
            refresh_token: self.refresh_token.clone(),
        })
    }
}

/// Plain acknowledgement body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

/// `GET /auth/me` responds either with the bare profile or wrapped in `user`.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum MeResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl MeResponse {
    pub(crate) fn into_profile(self) -> UserProfile {
        match self {
            Self::Wrapped { user } => user,
            Self::Bare(user) => user,
        }
    }
}
