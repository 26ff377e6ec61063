//! Identity resolution error types.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie};

/// Terminal failures of the per-request resolution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credential, or an invalid one. No refresh was attempted.
    Unauthenticated,
    /// Access token expired and the refresh attempt also failed or was
    /// impossible (missing cookie, revoked or overwritten stored token).
    SessionExpired,
    /// Unexpected store or codec failure.
    Internal,
}

/// Rejection returned by the [`CurrentUser`](super::CurrentUser) extractor.
///
/// Carries the secure-cookie flag captured from state at construction so the
/// response can clear cookies without consulting ambient configuration.
#[derive(Debug)]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub(super) secure_cookies: bool,
}

impl AuthError {
    pub(super) fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.kind {
            AuthErrorKind::Unauthenticated | AuthErrorKind::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::Unauthenticated => "Unauthenticated",
            AuthErrorKind::SessionExpired => "Session expired",
            // Full detail already logged server-side; the caller gets a
            // generic message.
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::HeaderValue;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // A dead session's cookies are useless to the client; clear both so
        // the next request starts clean. Other failures keep cookies intact.
        if self.kind == AuthErrorKind::SessionExpired {
            let headers = response.headers_mut();
            for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
                if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, self.secure_cookies)) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
