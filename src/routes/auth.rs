// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration and login routes.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::middleware::ValidatedJson;
use crate::services::auth::is_valid_username_char;
use crate::AppState;

/// Unauthenticated routes; rate limited in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

/// Routes that require a session token.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/auth/credentials", put(update_credentials))
}

/// Registration body.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 32, message = "must be 3-32 characters"),
        custom(function = validate_username_chars)
    )]
    pub username: String,
    #[validate(email(message = "must be an email address"))]
    pub apple_id: String,
    #[validate(length(min = 8, max = 128, message = "must be 8-128 characters"))]
    pub apple_password: String,
}

/// Login body. Only presence is checked; mismatches are 401s.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 32, message = "is required"))]
    pub username: String,
    #[validate(length(min = 1, max = 254, message = "is required"))]
    pub apple_id: String,
    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub apple_password: String,
}

/// Credentials update body.
#[derive(Deserialize, Validate)]
pub struct UpdateCredentialsRequest {
    #[validate(email(message = "must be an email address"))]
    pub apple_id: String,
    #[validate(length(min = 8, max = 128, message = "must be 8-128 characters"))]
    pub apple_password: String,
}

fn validate_username_chars(username: &str) -> std::result::Result<(), ValidationError> {
    if username.chars().all(is_valid_username_char) {
        return Ok(());
    }
    Err(ValidationError::new("username_chars")
        .with_message("may only contain letters, digits, '_', '.' and '-'".into()))
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub token: String,
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Register a new user.
async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let session = state
        .auth
        .register(&req.username, &req.apple_id, &req.apple_password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            success: true,
            token: session.token,
            user_id: session.user_id,
        }),
    ))
}

/// Log in an existing user.
async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let session = state
        .auth
        .login(&req.username, &req.apple_id, &req.apple_password)
        .await?;

    Ok(Json(SessionResponse {
        success: true,
        token: session.token,
        user_id: session.user_id,
    }))
}

/// Replace the caller's stored iCloud credentials.
async fn update_credentials(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<UpdateCredentialsRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .auth
        .update_credentials(user.user_id, &req.apple_id, &req.apple_password)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(username: &str, apple_id: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            apple_id: apple_id.to_string(),
            apple_password: password.to_string(),
        }
    }

    #[test]
    fn test_register_validation_accepts_valid() {
        assert!(register_request("alice", "a@icloud.com", "abcd-efgh-ijkl-mnop")
            .validate()
            .is_ok());
        assert!(register_request("a.b-c_d", "a@icloud.com", "12345678")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_register_validation_rejects_invalid() {
        let cases = [
            register_request("al", "a@icloud.com", "abcd-efgh"),
            register_request(&"x".repeat(33), "a@icloud.com", "abcd-efgh"),
            register_request("alice smith", "a@icloud.com", "abcd-efgh"),
            register_request("alice", "not-an-email", "abcd-efgh"),
            register_request("alice", "a@icloud.com", "short"),
        ];

        for req in cases {
            assert!(req.validate().is_err(), "expected rejection for {}", req.username);
        }
    }
}
