use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::auth::tokens::IssuedToken;

/// Request body for user registration. Fields are optional so that missing
/// ones surface as validation errors instead of a decode failure.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_confirmation: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for the token-exchange social login.
#[derive(Debug, Default, Deserialize)]
pub struct SocialLoginRequest {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

/// Token part of every authenticating response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenEnvelope {
    pub access_token: String,
    /// Unix timestamp.
    pub expires_at: Option<i64>,
    /// Seconds of validity at issuance.
    pub expires_in: Option<i64>,
}

impl From<&IssuedToken> for TokenEnvelope {
    fn from(issued: &IssuedToken) -> Self {
        let expires_at = issued.token.expires_at;
        Self {
            access_token: issued.plain_text.clone(),
            expires_at: expires_at.map(OffsetDateTime::unix_timestamp),
            expires_in: expires_at.map(|at| (at - issued.token.created_at).whole_seconds()),
        }
    }
}

impl TokenEnvelope {
    /// Query pairs for browser redirects; absent expiry fields are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("access_token", self.access_token.clone())];
        if let Some(at) = self.expires_at {
            pairs.push(("expires_at", at.to_string()));
        }
        if let Some(secs) = self.expires_in {
            pairs.push(("expires_in", secs.to_string()));
        }
        pairs
    }
}

/// Response returned after register, login or social login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub token: TokenEnvelope,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub token: TokenEnvelope,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub provider: Option<String>,
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub email_verified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            provider: user.provider.clone(),
            avatar: user.avatar.clone(),
            email_verified_at: user.email_verified_at,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
