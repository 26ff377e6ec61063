//! Client-side session cache.
//!
//! Holds the last known identity for one context, deduplicates concurrent
//! identity fetches, persists the identity to shared storage, and applies
//! writes made by other contexts on the same [`StorageHub`].
//!
//! Three states are distinct: *undetermined* (no snapshot yet, nothing in
//! storage), *signed out* (a snapshot saying nobody is signed in), and
//! *signed in*. A fresh cache on a hub that has never seen a session starts
//! undetermined and stays so until the first fetch completes. Storage holds
//! the signed-in identity as JSON under [`SESSION_STORAGE_KEY`]; the key is
//! removed on sign-out, so an observed removal means logged out while simple
//! absence at hydration time means undetermined.
//!
//! [`StorageHub`]: super::storage::StorageHub

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};

use super::fetcher::IdentityFetcher;
use super::storage::{SESSION_STORAGE_KEY, StorageHandle};
use crate::db::PublicUser;

const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// What the cache currently believes about the session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    /// `None` means nobody is signed in (a determined answer).
    pub identity: Option<PublicUser>,
}

/// Outcome of one [`SessionCache::fetch`] call. Fetch failures are not
/// surfaced here: an unreachable or erroring server resolves to a
/// signed-out snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchResult {
    /// The operation completed and this is the resulting snapshot.
    Done(SessionSnapshot),
    /// A newer operation superseded this one before it completed.
    Cancelled,
}

struct InFlight {
    // Sender lives here so the operation completes even when the future
    // that started it is dropped.
    tx: watch::Sender<Option<FetchResult>>,
    rx: watch::Receiver<Option<FetchResult>>,
}

struct CacheState {
    snapshot: Option<SessionSnapshot>,
    /// Bumped by every new fetch, local write, and applied remote write.
    /// A completing fetch whose epoch no longer matches is stale.
    epoch: u64,
    in_flight: Option<InFlight>,
}

struct CacheInner {
    fetcher: Arc<dyn IdentityFetcher>,
    storage: StorageHandle,
    state: Mutex<CacheState>,
    updates: broadcast::Sender<SessionSnapshot>,
}

/// Session cache for one context. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<CacheInner>,
}

impl SessionCache {
    /// Build a cache, hydrating from storage and listening for writes made
    /// by other contexts.
    pub fn new(fetcher: Arc<dyn IdentityFetcher>, storage: StorageHandle) -> Self {
        let snapshot = storage
            .get(SESSION_STORAGE_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .map(|identity| SessionSnapshot {
                identity: Some(identity),
            });

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut events = storage.subscribe();
        let inner = Arc::new(CacheInner {
            fetcher,
            storage,
            state: Mutex::new(CacheState {
                snapshot,
                epoch: 0,
                in_flight: None,
            }),
            updates,
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.key != SESSION_STORAGE_KEY {
                    continue;
                }
                let Some(inner) = weak.upgrade() else { break };
                // Key removal means another context logged out.
                let identity = match event.new_value {
                    Some(raw) => match serde_json::from_str(&raw) {
                        Ok(identity) => Some(identity),
                        Err(_) => continue,
                    },
                    None => None,
                };
                inner.apply_remote(SessionSnapshot { identity });
            }
        });

        Self { inner }
    }

    /// The current snapshot, or `None` while undetermined.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.inner.lock_state().snapshot.clone()
    }

    /// The signed-in identity, if any is known.
    pub fn identity(&self) -> Option<PublicUser> {
        self.inner
            .lock_state()
            .snapshot
            .as_ref()
            .and_then(|s| s.identity.clone())
    }

    /// True while the session is undetermined or a fetch is in flight.
    pub fn loading(&self) -> bool {
        let state = self.inner.lock_state();
        state.snapshot.is_none() || state.in_flight.is_some()
    }

    /// Snapshot change notifications. Fires only when the snapshot actually
    /// changes, including changes applied from other contexts.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Resolve the session, from cache when possible.
    ///
    /// Without `force`: a determined snapshot is returned as-is with no
    /// network call, and a call made while another fetch is in flight joins
    /// it and shares its result. With `force`, any in-flight fetch is
    /// superseded (its waiters get [`FetchResult::Cancelled`]) and a fresh
    /// one starts.
    pub async fn fetch(&self, force: bool) -> FetchResult {
        let mut rx = {
            let mut state = self.inner.lock_state();
            if !force {
                if let Some(op) = &state.in_flight {
                    op.rx.clone()
                } else if let Some(snapshot) = &state.snapshot {
                    return FetchResult::Done(snapshot.clone());
                } else {
                    self.inner.spawn_fetch(&mut state)
                }
            } else {
                self.inner.spawn_fetch(&mut state)
            }
        };

        let outcome = rx.wait_for(|v| v.is_some()).await;
        match outcome {
            Ok(value) => match value.as_ref() {
                Some(result) => result.clone(),
                None => FetchResult::Cancelled,
            },
            // Sender gone without a result: the cache was dropped.
            Err(_) => FetchResult::Cancelled,
        }
    }

    /// Install a snapshot directly, e.g. right after a login or logout
    /// response. Supersedes any in-flight fetch, persists to storage (key
    /// removal for sign-out), and notifies subscribers in this and other
    /// contexts. No network call.
    pub fn set_local(&self, identity: Option<PublicUser>) {
        let snapshot = SessionSnapshot { identity };
        let mut state = self.inner.lock_state();
        state.epoch += 1;
        if let Some(op) = state.in_flight.take() {
            let _ = op.tx.send(Some(FetchResult::Cancelled));
        }
        self.inner.persist(&snapshot);
        self.inner.install(&mut state, snapshot);
    }
}

impl CacheInner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a fetch under the state lock, superseding any current one.
    /// The network call runs on its own task so it completes even when
    /// every waiter is dropped.
    fn spawn_fetch(
        self: &Arc<Self>,
        state: &mut CacheState,
    ) -> watch::Receiver<Option<FetchResult>> {
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(op) = state.in_flight.take() {
            let _ = op.tx.send(Some(FetchResult::Cancelled));
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(InFlight { tx, rx: rx.clone() });

        let future = self.fetcher.fetch_identity();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = future.await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_fetch(epoch, result);
            }
        });

        rx
    }

    fn finish_fetch(
        &self,
        epoch: u64,
        result: Result<Option<PublicUser>, super::fetcher::FetchError>,
    ) {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            // Superseded; the superseder already resolved our waiters.
            return;
        }
        let Some(op) = state.in_flight.take() else {
            return;
        };

        // An unreachable or erroring server resolves to signed out rather
        // than leaving callers hanging in an undetermined state.
        let identity = match result {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(error = %e, "Identity fetch failed");
                None
            }
        };

        let snapshot = SessionSnapshot { identity };
        self.persist(&snapshot);
        self.install(&mut state, snapshot.clone());
        let _ = op.tx.send(Some(FetchResult::Done(snapshot)));
    }

    /// A write arrived from another context.
    fn apply_remote(&self, snapshot: SessionSnapshot) {
        let mut state = self.lock_state();
        state.epoch += 1;
        if let Some(op) = state.in_flight.take() {
            let _ = op.tx.send(Some(FetchResult::Cancelled));
        }
        self.install(&mut state, snapshot);
    }

    /// Write through to storage: identity JSON when signed in, key removal
    /// when signed out.
    fn persist(&self, snapshot: &SessionSnapshot) {
        match &snapshot.identity {
            Some(identity) => {
                if let Ok(raw) = serde_json::to_string(identity) {
                    self.storage.set(SESSION_STORAGE_KEY, &raw);
                }
            }
            None => self.storage.remove(SESSION_STORAGE_KEY),
        }
    }

    /// Set the snapshot and notify subscribers, but only on actual change.
    fn install(&self, state: &mut CacheState, snapshot: SessionSnapshot) {
        if state.snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        state.snapshot = Some(snapshot.clone());
        let _ = self.updates.send(snapshot);
    }
}
