#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use gatekey::{
    ServerConfig, create_app,
    db::{Database, NewUser, UserRole},
    jwt::{Claims, TokenKeys},
    password::hash_password,
    rate_limit::RateLimitConfig,
};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub keys: Arc<TokenKeys>,
}

/// Build the full router against an in-memory database, with rate limits
/// opened wide so tests never trip them.
pub async fn create_test_app() -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let access_secret = b"access-secret-for-testing-0123456789".to_vec();
    let refresh_secret = b"refresh-secret-for-testing-0123456789".to_vec();
    let keys = Arc::new(TokenKeys::new(&access_secret, &refresh_secret, 14));
    let config = ServerConfig {
        db: db.clone(),
        access_secret,
        refresh_secret,
        refresh_ttl_days: 14,
        secure_cookies: false,
        rate_limits: Arc::new(RateLimitConfig::unlimited()),
    };
    TestApp {
        app: create_app(&config),
        db,
        keys,
    }
}

/// Insert a user directly and return its row id.
pub async fn create_user(db: &Database, username: &str) -> i64 {
    static PHONE_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let password_hash = hash_password(TEST_PASSWORD).expect("Failed to hash password");
    db.users()
        .create(&NewUser {
            uuid: &uuid::Uuid::new_v4().to_string(),
            username,
            email: &format!("{username}@example.com"),
            phone: &format!(
                "+1555{:07}",
                PHONE_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            ),
            password_hash: &password_hash,
            role: UserRole::Customer,
        })
        .await
        .expect("Failed to create user")
}

/// Log in through the API and return the response.
pub async fn login(app: &Router, username: &str, password: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": username, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// GET /api/session/current with the given Cookie header, if any.
pub async fn get_current(app: &Router, cookies: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method("GET").uri("/api/session/current");
    if let Some(cookies) = cookies {
        builder = builder.header("cookie", cookies);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Sign an access token whose expiry is `secs_ago` seconds in the past.
pub async fn expired_access_token(db: &Database, keys: &TokenKeys, user_id: i64, secs_ago: u64) -> String {
    let user = db
        .users()
        .get_by_id(user_id)
        .await
        .expect("Failed to load user")
        .expect("User not found");
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        sub: user.uuid.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        role: user.role,
        iat: now - secs_ago - 60,
        exp: now - secs_ago,
        jti: None,
    };
    keys.access().sign(&claims).expect("Failed to sign token")
}

/// Extract the session jti from a signed refresh token.
pub fn refresh_jti(keys: &TokenKeys, refresh_token: &str) -> String {
    keys.refresh()
        .verify(refresh_token)
        .expect("Refresh token did not verify")
        .jti
        .expect("Refresh token has no jti")
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!("access_token={access_token}; refresh_token={refresh_token}")
}

/// Extract Set-Cookie headers from a response.
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Pull the value of a named cookie out of Set-Cookie headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let (cookie_name, rest) = c.split_once('=')?;
        if cookie_name == name {
            Some(rest.split(';').next().unwrap_or("").to_string())
        } else {
            None
        }
    })
}

/// Check if cookies contain a token being cleared (Max-Age=0).
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{cookie_name}=")) && c.contains("Max-Age=0"))
}

/// Check if cookies contain a fresh (non-cleared) access token.
pub fn has_new_access_token(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with("access_token=") && !c.contains("Max-Age=0"))
}

/// Read the response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
