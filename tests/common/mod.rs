// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use reminders_relay::config::Config;
use reminders_relay::db::CredentialStore;
use reminders_relay::middleware::rate_limit::RateLimiter;
use reminders_relay::routes::create_router;
use reminders_relay::services::{AuthService, CredentialCipher, InMemoryUpstream, RemindersGateway};
use reminders_relay::AppState;
use std::sync::Arc;
use tower::ServiceExt;

pub const APPLE_ID: &str = "alice@icloud.com";
pub const APPLE_PASSWORD: &str = "abcd-efgh-ijkl-mnop";

/// Create a test app backed by an in-memory store and upstream.
/// Returns the router, the shared state and a handle on the upstream.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>, InMemoryUpstream) {
    create_test_app_with(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(config: Config) -> (axum::Router, Arc<AppState>, InMemoryUpstream) {
    let store = CredentialStore::in_memory()
        .await
        .expect("Failed to open in-memory store");
    let cipher = CredentialCipher::new(&config.encryption_key).expect("Failed to build cipher");
    let auth = AuthService::new(store, cipher, config.jwt_signing_key.clone());

    let upstream = InMemoryUpstream::new();
    let reminders = RemindersGateway::new(auth.clone(), Arc::new(upstream.clone()));

    let state = Arc::new(AppState {
        auth_limiter: RateLimiter::per_minute(config.auth_rate_limit),
        api_limiter: RateLimiter::per_minute(config.api_rate_limit),
        config,
        auth,
        reminders,
    });

    (create_router(state.clone()), state, upstream)
}

/// Build a JSON request.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a body-less GET request.
#[allow(dead_code)]
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Collect a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Register a user through the API and return `(token, user_id)`.
#[allow(dead_code)]
pub async fn register(app: &axum::Router, username: &str, apple_id: &str, password: &str) -> (String, i64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({
                "username": username,
                "apple_id": apple_id,
                "apple_password": password,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}
