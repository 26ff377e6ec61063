//! Session API endpoints.
//!
//! - POST `/login` - Verify credentials, issue a token pair, set both cookies
//! - GET `/current` - Resolve the caller to a sanitized identity (with
//!   silent refresh on access-token expiry)
//! - POST `/logout` - Clear cookies and revoke the caller's session

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, CurrentUser, REFRESH_COOKIE_NAME, build_cookie, clear_cookie, get_cookie,
};
use crate::db::{Database, PublicUser};
use crate::impl_auth_backend;
use crate::issuer::{IssueError, TokenIssuer};
use crate::jwt::TokenKeys;
use crate::password::verify_password;
use crate::rate_limit::{RateLimitConfig, rate_limit_login};

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub keys: Arc<TokenKeys>,
    pub issuer: TokenIssuer,
    pub secure_cookies: bool,
    pub rate_limits: Arc<RateLimitConfig>,
}

impl_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_login,
        ));

    Router::new()
        .route("/current", get(current))
        .route("/logout", post(logout))
        .with_state(state)
        .merge(login_router)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    password: String,
}

/// Normalize a login selector: trimmed, lowercased, empty treated as absent.
fn selector(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Authenticate with any one of username/email/phone plus a password.
/// On success: 201, sanitized identity body, access and refresh cookies set.
async fn login(
    State(state): State<SessionState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = selector(&payload.username);
    let email = selector(&payload.email);
    let phone = selector(&payload.phone);

    if (username.is_none() && email.is_none() && phone.is_none()) || payload.password.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let user = state
        .db
        .users()
        .get_by_login(username.as_deref(), email.as_deref(), phone.as_deref())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let verified = verify_password(&payload.password, &user.password_hash)
        .internal_err("Failed to verify password")?;
    if !verified {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    // Refresh token is persisted before the pair is returned; the client
    // never receives a refresh token the server does not recognize.
    let pair = state.issuer.issue_pair(user.id).await.map_err(|e| match e {
        IssueError::NotFound => ApiError::not_found("User not found"),
        other => ApiError::internal_error("Failed to issue tokens", other),
    })?;

    let access_cookie = build_cookie(
        ACCESS_COOKIE_NAME,
        &pair.access.token,
        pair.access.duration,
        state.secure_cookies,
    );
    let refresh_cookie = build_cookie(
        REFRESH_COOKIE_NAME,
        &pair.refresh.token,
        pair.refresh.duration,
        state.secure_cookies,
    );

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(PublicUser::from(user)),
    ))
}

/// Return the caller's sanitized identity. The extractor performs the whole
/// resolution including the bounded refresh; a refreshed access cookie is
/// appended by the `add_access_token_cookie` layer.
async fn current(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user)
}

/// Log out: clear both cookies and revoke the caller's session record when
/// the refresh cookie still identifies one. Other sessions for the same
/// account are untouched. Idempotent; requires no valid token.
async fn logout(
    State(state): State<SessionState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // Best effort: a missing or unverifiable refresh cookie still logs out.
    if let Some(refresh_token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        if let Ok(claims) = state.keys.refresh().verify(refresh_token) {
            if let Some(jti) = claims.jti.as_deref() {
                if let Err(e) = state.db.sessions().delete_by_jti(jti).await {
                    tracing::warn!(error = %e, "Failed to revoke session");
                }
            }
        }
    }

    let clear_access = clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies);
    let clear_refresh = clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({ "success": true })),
    ))
}
