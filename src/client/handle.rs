//! Consumer-facing view of the session cache.

use tokio::sync::broadcast;

use super::cache::{FetchResult, SessionCache, SessionSnapshot};
use crate::db::PublicUser;

/// A handle a UI component would hold. Attaching to an undetermined cache
/// kicks off a background fetch; concurrent handles share one request.
#[derive(Clone)]
pub struct SessionHandle {
    cache: SessionCache,
}

impl SessionHandle {
    pub fn attach(cache: SessionCache) -> Self {
        if cache.snapshot().is_none() {
            let cache = cache.clone();
            tokio::spawn(async move {
                let _ = cache.fetch(false).await;
            });
        }
        Self { cache }
    }

    pub fn identity(&self) -> Option<PublicUser> {
        self.cache.identity()
    }

    pub fn loading(&self) -> bool {
        self.cache.loading()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.cache.subscribe()
    }

    /// Force a fresh identity fetch, superseding any in-flight one.
    pub async fn revalidate(&self) -> FetchResult {
        self.cache.fetch(true).await
    }

    /// Forget the session locally and in every other context. Performs no
    /// server call; pair with the logout endpoint to revoke server-side.
    pub fn clear(&self) {
        self.cache.set_local(None);
    }
}
