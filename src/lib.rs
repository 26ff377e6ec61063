pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod issuer;
pub mod jwt;
pub mod password;
pub mod rate_limit;

use api::{SessionState, create_api_router};
use auth::add_access_token_cookie;
use axum::{Router, middleware};
use db::Database;
use issuer::TokenIssuer;
use jwt::TokenKeys;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens; must differ from the access secret
    pub refresh_secret: Vec<u8>,
    /// Refresh token lifetime in days
    pub refresh_ttl_days: u64,
    /// Whether to set Secure flag on cookies (true for HTTPS deployments)
    pub secure_cookies: bool,
    /// Per-IP rate limits for credential endpoints
    pub rate_limits: Arc<RateLimitConfig>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let keys = Arc::new(TokenKeys::new(
        &config.access_secret,
        &config.refresh_secret,
        config.refresh_ttl_days,
    ));

    let state = SessionState {
        db: config.db.clone(),
        keys: keys.clone(),
        issuer: TokenIssuer::new(config.db.clone(), keys),
        secure_cookies: config.secure_cookies,
        rate_limits: config.rate_limits.clone(),
    };

    let api_router = create_api_router(state).layer(middleware::from_fn(add_access_token_cookie));

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// This should be called once at startup.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
