/**
 * Authentication API
 *
 * Endpoints for accounts and sessions.
 *
 * Flow:
 * 1. POST /api/auth/signup - Create an account (starts with the wallet grant)
 * 2. POST /api/auth/signin - Exchange email/password for a session token
 * 3. GET /api/auth/me - Current account (requires auth)
 * 4. POST /api/auth/signout - Invalidate the session
 */

use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::ApiResponse;
use crate::services::AuthError;
use crate::types::{AuthResponse, AuthenticatedUser, SignInRequest, SignUpRequest, UserAccount};
use crate::AppState;

/// Create auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/me", get(get_me))
}

/// POST /api/auth/signup
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let response = state.auth_service.sign_up(request)?;
    Ok(Json(ApiResponse { data: response }))
}

/// POST /api/auth/signin
async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let response = state.auth_service.sign_in(request)?;
    Ok(Json(ApiResponse { data: response }))
}

/// GET /api/auth/me
async fn get_me(auth: Authenticated) -> Json<ApiResponse<UserAccount>> {
    Json(ApiResponse {
        data: auth.user.user,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutResponse {
    pub signed_out: bool,
}

/// POST /api/auth/signout
async fn sign_out(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<SignOutResponse>> {
    let signed_out = state.auth_service.sign_out(&auth.user.session.token);
    Json(ApiResponse {
        data: SignOutResponse { signed_out },
    })
}

/// Extractor for the user behind an `Authorization: Bearer <token>` header.
pub struct Authenticated {
    pub user: AuthenticatedUser,
}

impl Authenticated {
    pub fn user_id(&self) -> &str {
        &self.user.user.id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        let user = state.auth_service.validate_session(token)?;
        Ok(Authenticated { user })
    }
}
