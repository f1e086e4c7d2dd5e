//! Route tree plus the HTTP middleware every deployment runs.
//!
//! `main.rs` and `tests/common` both call [`build_app_router`], so tests
//! exercise the production stack.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// `/health` plus the `/api` tree, wrapped in [`with_middleware`].
pub fn build_app_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_routes());
    with_middleware(routes, &state.config).with_state(state)
}

/// Outermost first: CORS, request id, tracing, timeout, panic recovery.
///
/// The request id is assigned before the trace span opens so every log line
/// of a request carries it, and copied back onto the response.
fn with_middleware(routes: Router<AppState>, config: &ServerConfig) -> Router<AppState> {
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    routes
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID))
        .layer(trace)
        .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
        .layer(build_cors_layer(&config.cors_origins))
}

/// CORS for the project and auth endpoints.
///
/// A `*` entry opens the API to every origin, without credentials. Entries
/// that are not valid header values are skipped with a warning.
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(allowed).allow_credentials(true)
}
