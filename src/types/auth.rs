//! Authentication Types
//!
//! Email/password accounts with bearer session tokens.

use serde::{Deserialize, Serialize};

use super::UserAccount;

/// Session lifetime.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Sign-up request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

/// Sign-in request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Stored credentials for an auth identity.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub id: String,
    pub email: String,
    /// Hex-encoded HMAC-SHA256(salt, password)
    pub password_hash: String,
    /// Hex-encoded random salt
    pub salt: String,
    pub created_at: i64,
}

/// Active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token
    pub token: String,
    /// Auth identity the session belongs to
    pub auth_user_id: String,
    /// When session was created (ms)
    pub created_at: i64,
    /// When session expires (ms)
    pub expires_at: i64,
}

impl Session {
    pub fn new(auth_user_id: String, ttl_ms: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            auth_user_id,
            created_at: now,
            expires_at: now + ttl_ms,
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() > self.expires_at
    }
}

/// Response to a successful sign-up or sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub session_token: String,
    pub expires_at: i64,
    pub user: UserAccount,
}

/// Authenticated user resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub session: Session,
    pub user: UserAccount,
}
