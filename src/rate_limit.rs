//! Rate limiting for credential endpoints.
//!
//! Token bucket with per-IP tracking to slow password brute force.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::net::SocketAddr;
use std::{num::NonZeroU32, sync::Arc};

/// Per-IP keyed limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login attempts: 5 per 10 seconds per IP
    pub login: Arc<IpLimiter>,
    /// Registration: 3 per minute per IP
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(NonZeroU32::new(1).unwrap())
                    .allow_burst(NonZeroU32::new(5).unwrap()),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(3).unwrap(),
            ))),
        }
    }

    /// Effectively unlimited configuration for tests.
    pub fn unlimited() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_second(
                NonZeroU32::new(10_000).unwrap(),
            ))),
            register: Arc::new(RateLimiter::keyed(Quota::per_second(
                NonZeroU32::new(10_000).unwrap(),
            ))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Client IP for limiter keying: X-Forwarded-For first (reverse proxy),
/// then the connection address.
fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

fn check(limiter: &IpLimiter, request: &Request) -> Result<(), Response> {
    // No resolvable IP (e.g. in-process test harness): let it through
    // rather than block everything behind one shared key.
    let Some(ip) = client_ip(request) else {
        return Ok(());
    };

    if limiter.check_key(&ip).is_err() {
        tracing::warn!(ip = %ip, "Rate limit exceeded");
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response());
    }
    Ok(())
}

/// Middleware limiting login attempts per IP.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.login, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware limiting registrations per IP.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.register, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
