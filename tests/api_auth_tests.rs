// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registration, login and token tests through the full router.
//!
//! These tests verify that:
//! 1. Registration and login issue usable session tokens
//! 2. Bad input, duplicates and wrong credentials get the right status
//! 3. Protected routes reject missing, tampered and expired tokens
//! 4. CORS preflight and health requests work without a token

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

mod common;

use common::{
    body_json, create_test_app, get_request, json_request, register, APPLE_ID, APPLE_PASSWORD,
};

/// Create a token with arbitrary expiry, signed with `signing_key`.
fn create_test_jwt(user_id: i64, signing_key: &[u8], exp_offset: i64) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        username: String,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id.to_string(),
        username: "alice".to_string(),
        exp: (now + exp_offset) as usize,
        iat: now as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

fn credentials(username: &str, apple_id: &str, password: &str) -> serde_json::Value {
    json!({
        "username": username,
        "apple_id": apple_id,
        "apple_password": password,
    })
}

#[tokio::test]
async fn test_register_returns_token() {
    let (app, state, _) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            credentials("alice", APPLE_ID, APPLE_PASSWORD),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let token = body["token"].as_str().unwrap();
    assert_eq!(
        state.auth.verify_token(token).unwrap(),
        body["user_id"].as_i64().unwrap()
    );
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let (app, _, _) = create_test_app().await;
    register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            credentials("alice", "other@icloud.com", "another-password"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "conflict");
    assert_eq!(body["error"], "Username already exists");
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let (app, _, _) = create_test_app().await;

    for body in [
        credentials("al", APPLE_ID, APPLE_PASSWORD),
        credentials("alice", "not-an-email", APPLE_PASSWORD),
        credentials("alice", APPLE_ID, "short"),
        json!({ "username": "alice" }),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/register", None, body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "validation_error");
    }
}

#[tokio::test]
async fn test_register_rejects_malformed_json() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_success() {
    let (app, _, _) = create_test_app().await;
    let (_, user_id) = register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            credentials("alice", APPLE_ID, APPLE_PASSWORD),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"].as_i64().unwrap(), user_id);
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn test_login_failures_look_the_same() {
    let (app, _, _) = create_test_app().await;
    register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    let mut bodies = Vec::new();
    for body in [
        credentials("nobody", APPLE_ID, APPLE_PASSWORD),
        credentials("alice", APPLE_ID, "wrong-password"),
        credentials("alice", "bob@icloud.com", APPLE_PASSWORD),
    ] {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/login", None, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_json(response).await);
    }

    assert_eq!(bodies[0]["code"], "invalid_credentials");
    assert!(bodies.iter().all(|b| *b == bodies[0]));
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(get_request("/api/reminders/lists", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_non_bearer_header() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/reminders/lists")
                .header(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_tampered_token() {
    let (app, _, _) = create_test_app().await;
    let (token, _) = register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    // Change the first character of the signature.
    let sig_start = token.rfind('.').unwrap() + 1;
    let replacement = if token[sig_start..].starts_with('A') { "B" } else { "A" };
    let mut tampered = token.clone();
    tampered.replace_range(sig_start..sig_start + 1, replacement);

    let response = app
        .oneshot(get_request("/api/reminders/lists", Some(&tampered)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn test_protected_route_with_wrong_key() {
    let (app, _, _) = create_test_app().await;
    let (_, user_id) = register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    let token = create_test_jwt(user_id, b"some_other_key_32_bytes_long!!!!", 3600);
    let response = app
        .oneshot(get_request("/api/reminders/lists", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_expired_token() {
    let (app, state, _) = create_test_app().await;
    let (_, user_id) = register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    // Well past the default validation leeway.
    let token = create_test_jwt(user_id, &state.config.jwt_signing_key, -3600);
    let response = app
        .oneshot(get_request("/api/reminders/lists", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn test_token_for_unknown_user() {
    let (app, state, _) = create_test_app().await;

    let token = create_test_jwt(4242, &state.config.jwt_signing_key, 3600);
    let response = app
        .oneshot(get_request("/api/reminders/lists", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_credentials() {
    let (app, _, upstream) = create_test_app().await;
    upstream.add_account("new@icloud.com", "brand-new-password");
    upstream.add_list("new@icloud.com", "L9", "Groceries");
    let (token, _) = register(&app, "alice", APPLE_ID, APPLE_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/auth/credentials",
            Some(&token),
            json!({ "apple_id": "new@icloud.com", "apple_password": "brand-new-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "success": true }));

    // Existing token keeps working and now reaches the new account.
    let response = app
        .clone()
        .oneshot(get_request("/api/reminders/lists", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "lists": [{ "id": "L9", "title": "Groceries" }] })
    );

    // Login now requires the new credentials.
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            credentials("alice", APPLE_ID, APPLE_PASSWORD),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_credentials_requires_token() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/auth/credentials",
            None,
            json!({ "apple_id": "new@icloud.com", "apple_password": "brand-new-password" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = create_test_app().await;

    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_security_headers_present() {
    let (app, _, _) = create_test_app().await;

    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/reminders/lists")
                .header(header::ORIGIN, "https://watch.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("GET"));
    assert!(methods.contains("PUT"));
}
