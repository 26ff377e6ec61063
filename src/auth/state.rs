//! Authentication backend trait and macro.

use crate::db::Database;
use crate::jwt::TokenKeys;

/// Trait for router state types that provide what identity resolution needs.
pub trait AuthBackend {
    fn keys(&self) -> &TokenKeys;
    fn db(&self) -> &Database;
    fn secure_cookies(&self) -> bool;
}

/// Implement [`AuthBackend`] for state structs with the standard fields:
/// `db: Database`, `keys: Arc<TokenKeys>`, `secure_cookies: bool`.
#[macro_export]
macro_rules! impl_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::AuthBackend for $state_type {
            fn keys(&self) -> &$crate::jwt::TokenKeys {
                &self.keys
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn secure_cookies(&self) -> bool {
                self.secure_cookies
            }
        }
    };
}
