/**
 * Authentication Service
 *
 * Email/password accounts and bearer sessions.
 *
 * Storage:
 * - SQLite: credentials and the trading account created at sign-up
 * - DashMap: active sessions (in memory, 24-hour TTL)
 */

use crate::services::SqliteStore;
use crate::types::{
    AuthIdentity, AuthResponse, AuthenticatedUser, LeaderboardEntry, Session, SignInRequest,
    SignUpRequest, UserAccount, WalletTransaction, WalletTransactionType, SESSION_TTL_MS,
    STARTING_BALANCE,
};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const MIN_PASSWORD_LEN: usize = 6;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
const SALT_LEN: usize = 16;

/// Hash a password as hex(HMAC-SHA256(salt, password)).
fn hash_password(salt: &[u8], password: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(salt)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {}", e)))?;
    mac.update(password.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a password against a stored hash.
fn verify_password(identity: &AuthIdentity, password: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&identity.salt), hex::decode(&identity.password_hash)) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(&salt) else {
        return false;
    };
    mac.update(password.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Authentication service for accounts and sessions.
#[derive(Clone)]
pub struct AuthService {
    /// Active sessions (session_token -> Session)
    sessions: Arc<DashMap<String, Session>>,
    /// SQLite store for credentials and accounts
    sqlite: Arc<SqliteStore>,
    /// Wallet grant for new accounts
    starting_balance: f64,
    session_ttl_ms: i64,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self::with_config(sqlite, STARTING_BALANCE, SESSION_TTL_MS)
    }

    pub fn with_config(sqlite: Arc<SqliteStore>, starting_balance: f64, session_ttl_ms: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            sqlite,
            starting_balance,
            session_ttl_ms,
        }
    }

    /// Register an account and open a session for it.
    ///
    /// The account starts with the configured wallet grant, recorded as an
    /// `initial_grant` wallet transaction, and appears on the leaderboard.
    pub fn sign_up(&self, request: SignUpRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        let username = request.username.trim().to_string();

        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if !USERNAME_LEN.contains(&username.chars().count()) {
            return Err(AuthError::InvalidUsername);
        }
        if self.sqlite.get_identity_by_email(&email).is_some() {
            return Err(AuthError::EmailTaken);
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let identity = AuthIdentity {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.clone(),
            password_hash: hash_password(&salt, &request.password)?,
            salt: hex::encode(salt),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let user = UserAccount::new(identity.id.clone(), email, username, self.starting_balance);
        let grant = WalletTransaction::new(
            user.id.clone(),
            self.starting_balance,
            WalletTransactionType::InitialGrant,
            Some("Starting balance".to_string()),
            None,
        );
        let entry = LeaderboardEntry::compute(
            user.id.clone(),
            user.username.clone(),
            user.total_portfolio_value,
            &[],
        );

        self.sqlite
            .create_account(&identity, &user, &grant, &entry)
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    AuthError::EmailTaken
                }
                other => AuthError::Database(other.to_string()),
            })?;

        info!("Created account {} ({})", user.username, user.id);

        let session = self.open_session(&identity.id);
        Ok(AuthResponse {
            session_token: session.token,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Check credentials and open a session.
    pub fn sign_in(&self, request: SignInRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        let identity = self
            .sqlite
            .get_identity_by_email(&email)
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&identity, &request.password) {
            debug!("Rejected sign-in for {}", identity.id);
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .sqlite
            .get_user_by_auth_id(&identity.id)
            .ok_or(AuthError::InvalidCredentials)?;

        let session = self.open_session(&identity.id);
        info!("User {} signed in", user.id);

        Ok(AuthResponse {
            session_token: session.token,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Invalidate a session token.
    pub fn sign_out(&self, token: &str) -> bool {
        let removed = self.sessions.remove(token).is_some();
        if removed {
            debug!("Session signed out");
        }
        removed
    }

    /// Resolve a bearer token to its session and account.
    pub fn validate_session(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let session = self
            .sessions
            .get(token)
            .map(|s| s.clone())
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_expired() {
            self.sessions.remove(token);
            return Err(AuthError::SessionNotFound);
        }

        let user = self.sqlite.get_user_by_auth_id(&session.auth_user_id).ok_or_else(|| {
            warn!("Session {} has no account", &session.token[..8]);
            AuthError::Unauthorized
        })?;

        Ok(AuthenticatedUser { session, user })
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop expired sessions.
    pub fn cleanup_expired(&self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired());
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!("Removed {} expired sessions", removed);
        }
    }

    fn open_session(&self, auth_user_id: &str) -> Session {
        let session = Session::new(auth_user_id.to_string(), self.session_ttl_ms);
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email address is invalid")]
    InvalidEmail,

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Username must be 3 to 32 characters")]
    InvalidUsername,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, code) = match &self {
            AuthError::InvalidEmail => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
            AuthError::WeakPassword => (StatusCode::BAD_REQUEST, "WEAK_PASSWORD"),
            AuthError::InvalidUsername => (StatusCode::BAD_REQUEST, "INVALID_USERNAME"),
            AuthError::EmailTaken => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::SessionNotFound => (StatusCode::UNAUTHORIZED, "SESSION_NOT_FOUND"),
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
