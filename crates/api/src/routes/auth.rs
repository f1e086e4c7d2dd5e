//! Route definitions for the `/auth` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /register    -> register
/// POST /login       -> login
/// GET  /validate    -> validate (requires auth)
/// POST /deactivate  -> deactivate (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/validate", get(auth::validate))
        .route("/deactivate", post(auth::deactivate))
}
