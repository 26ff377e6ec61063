//! Token encoding and verification.
//!
//! Dual-token system with two distinct symmetric secrets:
//! - Access tokens: short-lived (15 minutes), signed with the access secret
//! - Refresh tokens: long-lived (7-30 days, configurable), signed with the
//!   refresh secret and tracked by a session record keyed on the `jti` claim
//!
//! Verification distinguishes a structurally valid but time-expired token
//! from an invalid one. Only genuine expiry may trigger a refresh attempt.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::db::{User, UserRole};

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::TimeError)
        .map(|d| d.as_secs())
}

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Refresh token lifetime bounds (days). The exact value is configurable.
pub const REFRESH_TTL_MIN_DAYS: u64 = 7;
pub const REFRESH_TTL_MAX_DAYS: u64 = 30;
pub const REFRESH_TTL_DEFAULT_DAYS: u64 = 14;

/// Claims embedded in both token kinds. Timing fields are Unix seconds and
/// `exp` is always `iat` plus the configured lifetime. Claims never carry
/// secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    /// Username
    pub username: String,
    /// Email
    pub email: String,
    /// Phone
    pub phone: String,
    /// Role claim
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Token identifier. Present on refresh tokens, where it keys the
    /// session record; absent on access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A signed token together with its lifetime in seconds.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub duration: u64,
}

/// A signed refresh token plus the identity and timing of the session
/// record it must be persisted under.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub duration: u64,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Errors from signing a token.
#[derive(Debug)]
pub enum TokenError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors from verifying a token. Callers branch on this distinction:
/// `Expired` may trigger a refresh, `Invalid` never does.
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// Structurally valid token whose lifetime has elapsed
    Expired,
    /// Signature mismatch or malformed structure
    Invalid,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Expired => write!(f, "Token has expired"),
            VerifyError::Invalid => write!(f, "Invalid token"),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Codec for one token kind: deterministic signing and verification against
/// a single symmetric secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for a user with the given lifetime in seconds.
    pub fn issue_for(&self, user: &User, ttl_secs: u64) -> Result<IssuedToken, TokenError> {
        let now = unix_now()?;

        let claims = Claims {
            sub: user.uuid.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            iat: now,
            exp: now + ttl_secs,
            jti: None,
        };

        self.sign(&claims).map(|token| IssuedToken {
            token,
            duration: ttl_secs,
        })
    }

    /// Sign pre-built claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verify a token and extract its claims.
    ///
    /// Zero leeway: a token expired even one second ago must come back as
    /// `Expired` so the resolver can attempt a refresh.
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Invalid,
            })?;

        Ok(token_data.claims)
    }
}

/// Both codecs plus the configured refresh lifetime, built once at startup.
/// Missing secret material is a boot-time failure; by the time `TokenKeys`
/// exists, issuance can no longer fail on configuration.
#[derive(Clone)]
pub struct TokenKeys {
    access: TokenCodec,
    refresh: TokenCodec,
    refresh_ttl_secs: u64,
}

impl TokenKeys {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], refresh_ttl_days: u64) -> Self {
        Self {
            access: TokenCodec::new(access_secret),
            refresh: TokenCodec::new(refresh_secret),
            refresh_ttl_secs: refresh_ttl_days * 24 * 60 * 60,
        }
    }

    pub fn access(&self) -> &TokenCodec {
        &self.access
    }

    pub fn refresh(&self) -> &TokenCodec {
        &self.refresh
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    /// Issue a short-lived access token.
    pub fn issue_access(&self, user: &User) -> Result<IssuedToken, TokenError> {
        self.access.issue_for(user, ACCESS_TOKEN_TTL_SECS)
    }

    /// Issue a long-lived refresh token with a fresh `jti` identifying the
    /// session it belongs to.
    pub fn issue_refresh(&self, user: &User) -> Result<IssuedRefresh, TokenError> {
        let now = unix_now()?;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user.uuid.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            iat: now,
            exp: now + self.refresh_ttl_secs,
            jti: Some(jti.clone()),
        };

        self.refresh.sign(&claims).map(|token| IssuedRefresh {
            token,
            duration: self.refresh_ttl_secs,
            jti,
            issued_at: now,
            expires_at: now + self.refresh_ttl_secs,
        })
    }
}
