//! Handlers for the `/auth` resource (register, login, validate, deactivate).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskmaster_core::error::CoreError;
use taskmaster_core::user::{RegisterUser, User, UserResponse};

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{hash_password, password_matches};
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::middleware::auth::AuthUser;
use crate::response::MessageResponse;
use crate::state::AppState;
use crate::task::run_to_completion;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for `POST /auth/register`.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Response for `POST /auth/login`.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Response for `GET /auth/validate`.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub message: String,
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterUser>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let registration = input.validate(state.config.min_password_length)?;

    let password_hash = hash_password(&registration.password)?;
    let user = User::new(registration, password_hash, Utc::now());

    let repo = state.users.clone();
    let user = run_to_completion(async move { repo.create(user).await }).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: user.to_response(),
        }),
    ))
}

/// POST /api/auth/login
///
/// Unknown email, wrong password and deactivated account all produce the
/// same `INVALID_CREDENTIALS` response.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = state
        .users
        .find_by_email(&input.email)
        .await?
        .ok_or(CoreError::InvalidCredentials)?;

    if !user.is_active {
        tracing::info!(user_id = %user.id, "Login attempt on deactivated account");
        return Err(CoreError::InvalidCredentials.into());
    }

    if !password_matches(&user, &input.password) {
        return Err(CoreError::InvalidCredentials.into());
    }

    let repo = state.users.clone();
    let user_id = user.id.clone();
    let user = run_to_completion(async move { repo.record_successful_login(&user_id).await })
        .await?;

    let token = generate_access_token(&user.id, &user.email, &user.role, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        expires_in: state.config.jwt.expires_in_secs(),
        user: user.to_response(),
    }))
}

/// GET /api/auth/validate
pub async fn validate(auth_user: AuthUser) -> AppResult<Json<ValidateResponse>> {
    Ok(Json(ValidateResponse {
        message: "Token is valid".to_string(),
        user_id: auth_user.user_id,
    }))
}

/// POST /api/auth/deactivate
///
/// Deactivates the calling user's own account. Later logins fail.
pub async fn deactivate(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<MessageResponse>> {
    let repo = state.users.clone();
    let user_id = auth_user.user_id.clone();
    run_to_completion(async move { repo.set_active(&user_id, false).await }).await?;
    tracing::info!(user_id = %auth_user.user_id, "User deactivated");
    Ok(Json(MessageResponse::new("Account deactivated successfully")))
}
