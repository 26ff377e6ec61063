//! Shared key-value storage with cross-context change events.
//!
//! A [`StorageHub`] is one storage area shared by any number of contexts
//! (think of each context as one open tab). Every [`StorageHandle`] writes
//! through to the same map and broadcasts a change event; a handle's event
//! stream never yields events for its own writes, only for writes made
//! through other handles on the same hub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

/// Storage key under which the client session cache persists its snapshot.
pub const SESSION_STORAGE_KEY: &str = "gatekey.session";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One key change, as observed by contexts other than the writer.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    origin: u64,
}

struct HubInner {
    values: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_context: AtomicU64,
}

/// A shared storage area. Cheap to clone; all clones see the same data.
#[derive(Clone)]
pub struct StorageHub {
    inner: Arc<HubInner>,
}

impl StorageHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                values: Mutex::new(HashMap::new()),
                events,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new context on this hub.
    pub fn handle(&self) -> StorageHandle {
        StorageHandle {
            inner: self.inner.clone(),
            context_id: self.inner.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for StorageHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's view of a [`StorageHub`].
#[derive(Clone)]
pub struct StorageHandle {
    inner: Arc<HubInner>,
    context_id: u64,
}

impl StorageHandle {
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock_values().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.lock_values().insert(key.to_string(), value.to_string());
        self.emit(key, Some(value.to_string()));
    }

    pub fn remove(&self, key: &str) {
        let removed = self.lock_values().remove(key).is_some();
        if removed {
            self.emit(key, None);
        }
    }

    /// Subscribe to changes made through *other* handles on the same hub.
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            receiver: self.inner.events.subscribe(),
            context_id: self.context_id,
        }
    }

    fn lock_values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.inner.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, key: &str, new_value: Option<String>) {
        // Send fails only when no context is listening, which is fine.
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: self.context_id,
        });
    }
}

/// Event stream for one context. Skips the context's own writes and lagged
/// gaps; yields `None` when the hub is gone.
pub struct StorageEvents {
    receiver: broadcast::Receiver<StorageEvent>,
    context_id: u64,
}

impl StorageEvents {
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin == self.context_id => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
