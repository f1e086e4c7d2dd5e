//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use taskmaster_core::error::CoreError;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a JWT Bearer token in the `Authorization` header.
///
/// Any missing, malformed, badly signed, or expired token is rejected with
/// `401 INVALID_TOKEN`, as is a token whose user no longer exists or has
/// been deactivated.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's id (from `claims.sub`).
    pub user_id: String,
    pub email: String,
    pub role: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Core(CoreError::InvalidToken))?;

        let claims = validate_token(token, &state.config.jwt).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Core(CoreError::InvalidToken)
        })?;

        let user = match state.users.find_by_id(&claims.sub).await {
            Ok(user) => user,
            Err(CoreError::NotFound { .. }) => {
                tracing::debug!(user_id = %claims.sub, "Token for unknown user");
                return Err(AppError::Core(CoreError::InvalidToken));
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            tracing::debug!(user_id = %user.id, "Token for deactivated user");
            return Err(AppError::Core(CoreError::InvalidToken));
        }

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}
