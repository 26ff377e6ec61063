//! Identity fetching for the client session cache.
//!
//! [`IdentityFetcher`] abstracts the one network call the cache makes:
//! "who am I right now?". The real implementation ([`HttpFetcher`]) hits
//! `GET /api/session/current` with a cookie store, so a refreshed access
//! cookie returned by the server is picked up transparently.

use std::fmt;

use futures::future::BoxFuture;
use reqwest::StatusCode;

use crate::db::PublicUser;

#[derive(Debug)]
pub enum FetchError {
    /// The request never produced a usable answer (network, DNS, 5xx).
    Transport(String),
    /// The response body was not the expected identity payload.
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Resolves the current identity. `Ok(None)` means the server answered
/// authoritatively that nobody is signed in; errors mean we don't know.
pub trait IdentityFetcher: Send + Sync {
    fn fetch_identity(&self) -> BoxFuture<'static, Result<Option<PublicUser>, FetchError>>;
}

/// Fetches the identity over HTTP using a cookie-holding client.
pub struct HttpFetcher {
    client: reqwest::Client,
    current_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            current_url: format!("{}/api/session/current", base_url.trim_end_matches('/')),
        })
    }
}

impl IdentityFetcher for HttpFetcher {
    fn fetch_identity(&self) -> BoxFuture<'static, Result<Option<PublicUser>, FetchError>> {
        let client = self.client.clone();
        let url = self.current_url.clone();
        Box::pin(async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            match response.status() {
                StatusCode::OK => {
                    let user = response
                        .json::<PublicUser>()
                        .await
                        .map_err(|e| FetchError::Decode(e.to_string()))?;
                    Ok(Some(user))
                }
                // Both "no session" and "session expired" mean signed out.
                StatusCode::UNAUTHORIZED => Ok(None),
                status => Err(FetchError::Transport(format!(
                    "unexpected status {status}"
                ))),
            }
        })
    }
}
