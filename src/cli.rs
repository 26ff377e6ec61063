//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{REFRESH_TTL_MAX_DAYS, REFRESH_TTL_MIN_DAYS};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Gatekey", about = "Dual-token session authentication server")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7320")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "gatekey.db")]
    pub database: String,

    /// Public origin the server is reached at (full URL); HTTPS origins
    /// turn on the Secure cookie flag
    #[arg(long, default_value = "http://localhost:7320")]
    pub public_origin: String,

    /// Refresh token lifetime in days
    #[arg(long, default_value_t = crate::jwt::REFRESH_TTL_DEFAULT_DAYS,
        value_parser = validate_refresh_ttl)]
    pub refresh_ttl_days: u64,

    /// Path to file containing the access-token secret. Prefer the
    /// ACCESS_TOKEN_SECRET env var instead
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh-token secret. Prefer the
    /// REFRESH_TOKEN_SECRET env var instead
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_refresh_ttl(s: &str) -> Result<u64, String> {
    let days: u64 = s.parse().map_err(|_| format!("Not a number: {}", s))?;
    if !(REFRESH_TTL_MIN_DAYS..=REFRESH_TTL_MAX_DAYS).contains(&days) {
        return Err(format!(
            "Refresh TTL must be between {} and {} days",
            REFRESH_TTL_MIN_DAYS, REFRESH_TTL_MAX_DAYS
        ));
    }
    Ok(days)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load one token secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
fn load_secret(env_var: &str, file: Option<&str>, flag: &str) -> Option<Vec<u8>> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "Token secret is required. Set the {} environment variable (recommended) or use --{}",
            env_var, flag
        );
        return None;
    };

    if secret.len() < MIN_TOKEN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_TOKEN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret.into_bytes())
}

/// Load both token secrets. The two secrets must differ so an access token
/// can never pass refresh verification or vice versa.
pub fn load_token_secrets(args: &Args) -> Option<(Vec<u8>, Vec<u8>)> {
    let access = load_secret(
        "ACCESS_TOKEN_SECRET",
        args.access_secret_file.as_deref(),
        "access-secret-file",
    )?;
    let refresh = load_secret(
        "REFRESH_TOKEN_SECRET",
        args.refresh_secret_file.as_deref(),
        "refresh-secret-file",
    )?;

    if access == refresh {
        error!("Access and refresh token secrets must not be the same");
        return None;
    }

    Some((access, refresh))
}

/// Parse and validate the public-origin URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match Url::parse(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    public_origin: Url,
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    refresh_ttl_days: u64,
) -> ServerConfig {
    let secure_cookies = public_origin.scheme() == "https";

    ServerConfig {
        db,
        access_secret,
        refresh_secret,
        refresh_ttl_days,
        secure_cookies,
        rate_limits: Arc::new(RateLimitConfig::new()),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
