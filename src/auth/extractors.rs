//! Axum extractor implementing per-request identity resolution.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};

use super::cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie, get_bearer, get_cookie,
};
use super::errors::{AuthError, AuthErrorKind};
use super::state::AuthBackend;
use crate::db::PublicUser;
use crate::jwt::VerifyError;

tokio::task_local! {
    /// Task-local hand-off for the refreshed access-token cookie.
    /// Set by the extractor, consumed by [`add_access_token_cookie`].
    pub static NEW_ACCESS_TOKEN_COOKIE: RefCell<Option<String>>;
}

/// Response-layer middleware that appends the refreshed access-token cookie
/// produced during extraction, if any. Must wrap every router that uses
/// [`CurrentUser`].
pub async fn add_access_token_cookie(request: Request, next: Next) -> Response {
    NEW_ACCESS_TOKEN_COOKIE
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;
            let cookie = NEW_ACCESS_TOKEN_COOKIE.with(|cell| cell.borrow_mut().take());
            if let Some(cookie) = cookie {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            response
        })
        .await
}

/// Extractor resolving the caller to a sanitized identity.
///
/// Resolution per request: extract the access token (cookie wins over a
/// bearer header), verify it, and on genuine expiry perform exactly one
/// refresh attempt using the refresh-token cookie. An invalid signature
/// never triggers a refresh. The request either succeeds outright, succeeds
/// after one refresh, or fails; there is no second attempt.
pub struct CurrentUser(pub PublicUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: AuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_identity(parts, state).await.map(CurrentUser)
    }
}

async fn resolve_identity<S>(parts: &Parts, state: &S) -> Result<PublicUser, AuthError>
where
    S: AuthBackend + Send + Sync,
{
    let secure = state.secure_cookies();
    let err = |kind| AuthError::new(kind, secure);

    // Cookie wins when both cookie and bearer header are present.
    let access_token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
        .or_else(|| get_bearer(&parts.headers))
        .ok_or_else(|| err(AuthErrorKind::Unauthenticated))?;

    match state.keys().access().verify(access_token) {
        Ok(claims) => {
            // Subject id first, username claim as fallback for a malformed
            // or stale subject.
            let user = match state.db().users().get_by_uuid(&claims.sub).await {
                Ok(Some(user)) => Some(user),
                Ok(None) => state
                    .db()
                    .users()
                    .get_by_username(&claims.username)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to look up user");
                        err(AuthErrorKind::Internal)
                    })?,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to look up user");
                    return Err(err(AuthErrorKind::Internal));
                }
            };
            user.map(PublicUser::from)
                .ok_or_else(|| err(AuthErrorKind::Unauthenticated))
        }
        // An invalid signature must never trigger a refresh attempt.
        Err(VerifyError::Invalid) => Err(err(AuthErrorKind::Unauthenticated)),
        Err(VerifyError::Expired) => attempt_refresh(parts, state).await,
    }
}

/// The refresh path, bounded to a single attempt per request.
async fn attempt_refresh<S>(parts: &Parts, state: &S) -> Result<PublicUser, AuthError>
where
    S: AuthBackend + Send + Sync,
{
    let secure = state.secure_cookies();
    let err = |kind| AuthError::new(kind, secure);

    let refresh_token = get_cookie(&parts.headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| err(AuthErrorKind::SessionExpired))?;

    // A refresh token that fails verification for any reason ends the
    // session; there is nothing left to silently renew with.
    let claims = state
        .keys()
        .refresh()
        .verify(refresh_token)
        .map_err(|_| err(AuthErrorKind::SessionExpired))?;

    // The session record is authoritative: a miss on the jti means the
    // session was revoked by logout or purged after expiry.
    let jti = claims
        .jti
        .as_deref()
        .ok_or_else(|| err(AuthErrorKind::SessionExpired))?;
    let session = state
        .db()
        .sessions()
        .get_by_jti(jti)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to look up session");
            err(AuthErrorKind::Internal)
        })?
        .ok_or_else(|| err(AuthErrorKind::SessionExpired))?;

    let user = state
        .db()
        .users()
        .get_by_id(session.user_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to look up user");
            err(AuthErrorKind::Internal)
        })?
        .ok_or_else(|| err(AuthErrorKind::SessionExpired))?;

    // Re-issue the access token only. The refresh token is not rotated in
    // the minimal flow.
    let access = state.keys().issue_access(&user).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue access token");
        err(AuthErrorKind::Internal)
    })?;

    let cookie = build_cookie(ACCESS_COOKIE_NAME, &access.token, access.duration, secure);
    let _ = NEW_ACCESS_TOKEN_COOKIE.try_with(|cell| {
        cell.borrow_mut().replace(cookie);
    });

    Ok(PublicUser::from(user))
}
