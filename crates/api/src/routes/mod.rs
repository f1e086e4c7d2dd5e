pub mod auth;
pub mod health;
pub mod project;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /auth/register                 register (public)
/// /auth/login                    login (public)
/// /auth/validate                 validate token (requires auth)
/// /auth/deactivate               deactivate own account (requires auth)
///
/// /projects                      list, create
/// /projects/csv                  CSV export (requires auth)
/// /projects/{id}                 get, update, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/projects", project::router())
}
