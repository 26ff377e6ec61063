//! HTTP API routers.

use axum::Router;

mod error;
pub mod session;
pub mod users;

pub use error::{ApiError, ResultExt};
pub use session::SessionState;

/// Assemble all API routes under one router, to be nested at `/api`.
pub fn create_api_router(state: SessionState) -> Router {
    Router::new()
        .nest("/session", session::router(state.clone()))
        .nest("/users", users::router(state))
}
