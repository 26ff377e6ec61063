//! Server-side identity resolution.
//!
//! Dual-token flow: a short-lived access token (15 minutes, stateless) is
//! verified on every request; on genuine expiry the resolver performs one
//! bounded refresh using the long-lived refresh token, whose session record
//! must still exist, re-issuing an access token without rotating the
//! refresh token.

mod cookie;
mod errors;
mod extractors;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie, clear_cookie, get_bearer, get_cookie,
};
pub use errors::{AuthError, AuthErrorKind};
pub use extractors::{CurrentUser, NEW_ACCESS_TOKEN_COOKIE, add_access_token_cookie};
pub use state::AuthBackend;
