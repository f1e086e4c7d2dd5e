#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use taskmaster_api::auth::jwt::JwtConfig;
use taskmaster_api::config::{ServerConfig, StorageConfig};
use taskmaster_api::router::build_app_router;
use taskmaster_api::state::AppState;
use taskmaster_db::medium::{LocalFileMedium, MemoryMedium};
use taskmaster_db::DurableMedium;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        min_password_length: 8,
        store_max_retries: 3,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            expiry_mins: 60,
        },
        storage: StorageConfig::Memory,
    }
}

/// Full application router over the given medium, with the same middleware
/// stack production uses.
pub fn build_test_app_with(medium: Arc<dyn DurableMedium>) -> Router {
    build_app_router(AppState::new(medium, test_config()))
}

/// Full application router over a fresh in-memory medium.
pub fn build_test_app() -> Router {
    build_test_app_with(Arc::new(MemoryMedium::new()))
}

/// Full application router over CSV files in `dir`.
pub async fn build_file_app(dir: impl Into<PathBuf>) -> Router {
    let medium = LocalFileMedium::open(dir).await.unwrap();
    build_test_app_with(Arc::new(medium))
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    token: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, Some(token)).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), None).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(token)).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None, None).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Register a user and log in, returning the bearer token.
pub async fn register_and_login(app: &Router, email: &str, password: &str) -> String {
    let body = serde_json::json!({
        "email": email,
        "password": password,
        "name": "Test User",
        "role": "engineer",
        "department": "QA",
    });
    let response = post_json(app.clone(), "/api/auth/register", body).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);

    let body = serde_json::json!({ "email": email, "password": password });
    let response = post_json(app.clone(), "/api/auth/login", body).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}
