//! User registration endpoint.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;
use uuid::Uuid;

use super::error::{ApiError, ResultExt};
use super::session::SessionState;
use crate::db::{NewUser, PublicUser, UserRole};
use crate::password::hash_password;
use crate::rate_limit::rate_limit_register;

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limits,
            rate_limit_register,
        ))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    phone: String,
    password: String,
}

/// Create an account. Username, email and phone must all be unused; the
/// password is stored as an Argon2id hash, never in clear.
async fn register(
    State(state): State<SessionState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim().to_lowercase();
    let email = payload.email.trim().to_lowercase();
    let phone = payload.phone.trim().to_string();

    if username.is_empty() || email.is_empty() || phone.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let taken = state
        .db
        .users()
        .identity_taken(&username, &email, &phone)
        .await
        .db_err("Failed to check existing users")?;
    if taken {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash =
        hash_password(&payload.password).internal_err("Failed to hash password")?;

    let id = state
        .db
        .users()
        .create(&NewUser {
            uuid: &Uuid::new_v4().to_string(),
            username: &username,
            email: &email,
            phone: &phone,
            password_hash: &password_hash,
            role: UserRole::Customer,
        })
        .await
        .db_err("Failed to create user")?;

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to load created user")?
        .ok_or_else(|| ApiError::internal("Failed to load created user"))?;

    Ok((StatusCode::CREATED, Json(PublicUser::from(user))))
}
