//! Session issuance and the CSRF token endpoint.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use openpenpal_errors::DomainError;
use openpenpal_gateway::csrf;
use openpenpal_types::{ApiResponse, User};
use serde::{Deserialize, Serialize};

use crate::auth::verify_password;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, DomainError> {
    let credential = state
        .users
        .credential_by_username(&req.username)
        .await?
        .ok_or(DomainError::Unauthenticated)?;

    if !verify_password(&req.password, &credential.password_hash) {
        return Err(DomainError::Unauthenticated);
    }

    let token = state
        .session_keys
        .issue(credential.user.id, credential.user.role, Utc::now())?;
    Ok(Json(ApiResponse::ok(LoginResponse {
        token,
        user: credential.user,
    })))
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// Issues a double-submit token: the same value lands in a cookie and in
/// the body for the client to echo back via `X-CSRF-Token`. The cookie is
/// deliberately not HttpOnly, since the client must be able to read it.
pub async fn issue_csrf(State(state): State<AppState>) -> Response {
    let token = csrf::issue(
        state.settings.hmac_secret.as_bytes(),
        Utc::now(),
        state.settings.csrf_token_ttl_secs,
    );
    let cookie = format!(
        "{}={token}; Path=/; Max-Age={}; SameSite=Strict",
        csrf::CSRF_COOKIE,
        state.settings.csrf_token_ttl_secs
    );
    let body = Json(ApiResponse::ok(CsrfResponse { csrf_token: token }));
    ([(SET_COOKIE, cookie)], body).into_response()
}
