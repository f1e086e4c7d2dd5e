use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use taskmaster_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `taskmaster_core` (or the store beneath it).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

const SANITIZED: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => {
                let code = core.code();
                match core {
                    CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, code, msg.clone()),
                    CoreError::NotFound { entity, id } => (
                        StatusCode::NOT_FOUND,
                        code,
                        format!("{entity} with id {id} not found"),
                    ),
                    CoreError::DuplicateId { .. } | CoreError::DuplicateEmail(_) => {
                        (StatusCode::CONFLICT, code, core.to_string())
                    }
                    CoreError::TooManyConflicts { attempts } => {
                        tracing::warn!(attempts, "Write abandoned after repeated conflicts");
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            code,
                            "The data changed concurrently too many times, please retry"
                                .to_string(),
                        )
                    }
                    CoreError::MediumUnavailable(msg) => {
                        tracing::error!(error = %msg, "Storage medium unavailable");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            code,
                            "Storage is temporarily unavailable".to_string(),
                        )
                    }
                    CoreError::MalformedData { field, reason } => {
                        tracing::error!(%field, %reason, "Malformed stored data");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            code,
                            format!("Stored data is malformed (field '{field}')"),
                        )
                    }
                    CoreError::InvalidCredentials | CoreError::InvalidToken => {
                        (StatusCode::UNAUTHORIZED, code, core.to_string())
                    }
                    CoreError::Internal(msg) => {
                        tracing::error!(error = %msg, "Internal core error");
                        (StatusCode::INTERNAL_SERVER_ERROR, code, SANITIZED.to_string())
                    }
                }
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    SANITIZED.to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
