//! Client-side session management: a cached, fetch-deduplicating view of
//! the current identity, shared across contexts through storage events.

pub mod cache;
pub mod fetcher;
pub mod handle;
pub mod storage;

pub use cache::{FetchResult, SessionCache, SessionSnapshot};
pub use fetcher::{FetchError, HttpFetcher, IdentityFetcher};
pub use handle::SessionHandle;
pub use storage::{SESSION_STORAGE_KEY, StorageEvent, StorageEvents, StorageHandle, StorageHub};
